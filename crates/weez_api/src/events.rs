//! Normalization of decoded SSE frames into [`StreamEvent`]
//!
//! The chat backend has spoken two message shapes over time:
//!
//! ```text
//! event: token                      data: {"type":"token","content":"Hi"}
//! data: {"content":"Hi"}
//! ```
//!
//! Both are folded into one tagged union here, so the decode loop never needs
//! to know which shape is live. Dropping the legacy `type` shape means
//! deleting the fallback branch in [`normalize_frame`].

use crate::framing::{decode_json, first_string, FramingError, RawFrame};
use serde_json::Value;

const CONVERSATION_ID_KEYS: &[&str] = &["conversation_id", "conversationId"];
const ERROR_MESSAGE_KEYS: &[&str] = &["message", "error"];

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token {
        content: String,
        conversation_id: Option<String>,
    },
    Error {
        message: String,
        conversation_id: Option<String>,
    },
    Done {
        conversation_id: Option<String>,
    },
    /// Frame without a known tag; dropped by the decode loop
    Unrecognized,
}

impl StreamEvent {
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Token {
                conversation_id, ..
            }
            | StreamEvent::Error {
                conversation_id, ..
            }
            | StreamEvent::Done { conversation_id } => conversation_id.as_deref(),
            StreamEvent::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventTag {
    Token,
    Error,
    Done,
}

impl EventTag {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "token" => Some(EventTag::Token),
            "error" => Some(EventTag::Error),
            "done" => Some(EventTag::Done),
            _ => None,
        }
    }
}

/// Map a raw frame of either wire shape onto a [`StreamEvent`].
///
/// The `event:` line wins when it names a known event; otherwise the `type`
/// field of the JSON body decides.
pub fn normalize_frame(frame: &RawFrame) -> Result<StreamEvent, FramingError> {
    let body = decode_json(&frame.data)?;

    let tag = frame
        .event
        .as_deref()
        .and_then(EventTag::parse)
        .or_else(|| body.get("type").and_then(Value::as_str).and_then(EventTag::parse));

    let conversation_id = first_string(&body, CONVERSATION_ID_KEYS);

    let event = match tag {
        Some(EventTag::Token) => match body.get("content").and_then(Value::as_str) {
            Some(content) => StreamEvent::Token {
                content: content.to_string(),
                conversation_id,
            },
            None => StreamEvent::Unrecognized,
        },
        Some(EventTag::Error) => StreamEvent::Error {
            message: error_message(&body),
            conversation_id,
        },
        Some(EventTag::Done) => StreamEvent::Done { conversation_id },
        None => StreamEvent::Unrecognized,
    };

    Ok(event)
}

fn error_message(body: &Value) -> String {
    first_string(body, ERROR_MESSAGE_KEYS)
        .or_else(|| {
            body.get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown stream error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: Option<&str>, data: &str) -> RawFrame {
        RawFrame {
            event: event.map(str::to_string),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_event_tagged_token() {
        let event = normalize_frame(&frame(
            Some("token"),
            r#"{"content":"Hel","conversation_id":"c1"}"#,
        ))
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::Token {
                content: "Hel".to_string(),
                conversation_id: Some("c1".to_string()),
            }
        );
    }

    #[test]
    fn test_type_tagged_token() {
        let event = normalize_frame(&frame(None, r#"{"type":"token","content":"lo"}"#)).unwrap();
        assert_eq!(
            event,
            StreamEvent::Token {
                content: "lo".to_string(),
                conversation_id: None,
            }
        );
    }

    #[test]
    fn test_event_line_wins_over_type_field() {
        let event =
            normalize_frame(&frame(Some("done"), r#"{"type":"token","content":"x"}"#)).unwrap();
        assert_eq!(
            event,
            StreamEvent::Done {
                conversation_id: None
            }
        );
    }

    #[test]
    fn test_unknown_event_falls_back_to_type() {
        let event = normalize_frame(&frame(Some("message"), r#"{"type":"done"}"#)).unwrap();
        assert!(matches!(event, StreamEvent::Done { .. }));
    }

    #[test]
    fn test_error_message_fields() {
        let from_message =
            normalize_frame(&frame(Some("error"), r#"{"message":"quota exceeded"}"#)).unwrap();
        assert_eq!(
            from_message,
            StreamEvent::Error {
                message: "quota exceeded".to_string(),
                conversation_id: None,
            }
        );

        let from_error = normalize_frame(&frame(None, r#"{"type":"error","error":"boom"}"#)).unwrap();
        assert!(matches!(from_error, StreamEvent::Error { message, .. } if message == "boom"));

        let nested =
            normalize_frame(&frame(Some("error"), r#"{"error":{"message":"nested"}}"#)).unwrap();
        assert!(matches!(nested, StreamEvent::Error { message, .. } if message == "nested"));

        let empty = normalize_frame(&frame(Some("error"), "{}")).unwrap();
        assert!(
            matches!(empty, StreamEvent::Error { message, .. } if message == "Unknown stream error")
        );
    }

    #[test]
    fn test_camel_case_conversation_id() {
        let event = normalize_frame(&frame(Some("done"), r#"{"conversationId":"c7"}"#)).unwrap();
        assert_eq!(event.conversation_id(), Some("c7"));
    }

    #[test]
    fn test_token_without_content_is_unrecognized() {
        let event = normalize_frame(&frame(Some("token"), r#"{"text":"x"}"#)).unwrap();
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_untagged_frame_is_unrecognized() {
        let event = normalize_frame(&frame(None, r#"{"content":"x"}"#)).unwrap();
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_invalid_json_is_framing_error() {
        let err = normalize_frame(&frame(Some("token"), "not json")).unwrap_err();
        assert!(matches!(err, FramingError::InvalidJson { .. }));
    }
}
