//! Chat client for the streaming and buffered chat endpoints
//!
//! [`ChatClient::stream`] owns one HTTP connection per call and drives the
//! decode loop in [`process_chunk_stream`] until a `done` frame, end of body,
//! cancellation or a transport failure. Every call owns its own frame buffer,
//! so independent streams never share state.

use crate::events::{normalize_frame, StreamEvent};
use crate::framing::{parse_frame, SseFrameBuffer};
use crate::streaming::{ChunkStream, HttpChunkStream};
use crate::types::{ApiError, ChatResponse, ChatStreamRequest, HealthStatus, StreamingError};
use crate::utils::{apply_headers, check_response_error, join_url};
use crate::{ErrorKind, StreamingCallback, StreamingChunk};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STREAM_PATH: &str = "/chat/stream";
const CHAT_PATH: &str = "/chat";
const HEALTH_PATH: &str = "/health";

/// Behaviour knobs of the streaming decode loop
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Stop reading after the first server `error` frame instead of continuing
    pub stop_on_error: bool,
    /// Give up when no bytes arrive for this long; `None` waits forever
    pub idle_timeout: Option<Duration>,
}

/// How a stream came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    DoneFrame,
    EndOfStream,
    /// Server error frame with `stop_on_error` set
    ErrorFrame,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub conversation_id: Option<String>,
    pub tokens: usize,
    pub errors: usize,
    pub end: EndReason,
}

pub struct ChatClient {
    client: Client,
    base_url: String,
    headers: HashMap<String, String>,
    options: StreamOptions,
}

impl ChatClient {
    pub fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }

    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            headers: HashMap::new(),
            options: StreamOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    /// Extra headers sent with every request (e.g. authorization)
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Stream one chat turn, reporting every decoded event through `callback`.
    ///
    /// Transport failures are reported once as [`ErrorKind::Transport`] and
    /// returned as `Err`; no `Done` follows them. Cancelling `cancel` (also from
    /// inside the callback) aborts the request and silences further callbacks.
    pub async fn stream(
        &self,
        request: &ChatStreamRequest,
        callback: &StreamingCallback,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary, ApiError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream cancelled before the response arrived");
                return Ok(StreamSummary::cancelled(None));
            }
            opened = self.open_stream(request) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(e) => {
                report_transport_error(callback, &e);
                return Err(e);
            }
        };

        let mut chunk_stream = HttpChunkStream::new(response);
        process_chunk_stream(&mut chunk_stream, callback, &self.options, cancel).await
    }

    async fn open_stream(&self, request: &ChatStreamRequest) -> Result<reqwest::Response, ApiError> {
        validate_request(request)?;

        info!(
            space_id = %request.space_id,
            conversation_id = ?request.conversation_id,
            "Opening chat stream"
        );

        let builder = self
            .client
            .post(join_url(&self.base_url, STREAM_PATH))
            .header("accept", "text/event-stream");

        let response = apply_headers(builder, &self.headers)
            .json(request)
            .send()
            .await?;

        debug!("Response headers: {:?}", response.headers());
        check_response_error(response).await
    }

    /// Buffered variant of [`ChatClient::stream`] for when streaming is unavailable
    pub async fn send_once(&self, request: &ChatStreamRequest) -> Result<ChatResponse, ApiError> {
        validate_request(request)?;

        let builder = self
            .client
            .post(join_url(&self.base_url, CHAT_PATH))
            .header("accept", "application/json");

        let response = apply_headers(builder, &self.headers)
            .json(request)
            .send()
            .await?;
        let response = check_response_error(response).await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        serde_json::from_str(&response_text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse chat response: {e}")))
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let builder = self.client.get(join_url(&self.base_url, HEALTH_PATH));
        let response = apply_headers(builder, &self.headers).send().await?;
        let response = check_response_error(response).await?;

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse health status: {e}")))
    }
}

fn validate_request(request: &ChatStreamRequest) -> Result<(), ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::InvalidRequest("query must not be empty".to_string()));
    }
    Ok(())
}

fn report_transport_error(callback: &StreamingCallback, error: &ApiError) {
    warn!("Chat stream failed: {error}");
    let _ = callback(&StreamingChunk::Error {
        kind: ErrorKind::Transport,
        message: error.to_string(),
    });
}

impl StreamSummary {
    fn cancelled(conversation_id: Option<String>) -> Self {
        Self {
            conversation_id,
            tokens: 0,
            errors: 0,
            end: EndReason::Cancelled,
        }
    }
}

enum Flow {
    Continue,
    Stop(EndReason),
}

/// Per-stream decoding state
struct StreamState<'a> {
    buffer: SseFrameBuffer,
    callback: &'a StreamingCallback,
    stop_on_error: bool,
    conversation_id: Option<String>,
    tokens: usize,
    errors: usize,
}

impl<'a> StreamState<'a> {
    fn new(callback: &'a StreamingCallback, stop_on_error: bool) -> Self {
        Self {
            buffer: SseFrameBuffer::new(),
            callback,
            stop_on_error,
            conversation_id: None,
            tokens: 0,
            errors: 0,
        }
    }

    fn summary(&self, end: EndReason) -> StreamSummary {
        StreamSummary {
            conversation_id: self.conversation_id.clone(),
            tokens: self.tokens,
            errors: self.errors,
            end,
        }
    }

    /// Hand a chunk to the callback; a callback error means the caller wants out.
    fn emit(&self, chunk: StreamingChunk) -> Flow {
        match (self.callback)(&chunk) {
            Ok(()) => Flow::Continue,
            Err(e) => {
                match e.downcast_ref::<StreamingError>() {
                    Some(StreamingError::UserCancelled) => debug!("Streaming cancelled by user"),
                    None => warn!("Streaming callback failed, stopping: {e}"),
                }
                Flow::Stop(EndReason::Cancelled)
            }
        }
    }

    fn handle_block(&mut self, block: &str) -> Flow {
        let frame = match parse_frame(block) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                warn!("Dropping malformed stream message: {e}");
                return Flow::Continue;
            }
        };

        debug!(event = ?frame.event, "Received stream event: {}", frame.data);

        let event = match normalize_frame(&frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed stream message: {e}");
                return Flow::Continue;
            }
        };

        if let Some(id) = event.conversation_id() {
            self.conversation_id = Some(id.to_string());
        }

        match event {
            StreamEvent::Token { content, .. } => {
                self.tokens += 1;
                self.emit(StreamingChunk::Token { content })
            }
            StreamEvent::Error { message, .. } => {
                self.errors += 1;
                match self.emit(StreamingChunk::Error {
                    kind: ErrorKind::Protocol,
                    message,
                }) {
                    Flow::Continue if self.stop_on_error => Flow::Stop(EndReason::ErrorFrame),
                    flow => flow,
                }
            }
            StreamEvent::Done { .. } => {
                match self.emit(StreamingChunk::Done {
                    conversation_id: self.conversation_id.clone(),
                }) {
                    Flow::Continue => Flow::Stop(EndReason::DoneFrame),
                    flow => flow,
                }
            }
            StreamEvent::Unrecognized => {
                warn!("Ignoring unrecognized stream message: {}", frame.data);
                Flow::Continue
            }
        }
    }
}

async fn read_chunk(
    chunk_stream: &mut dyn ChunkStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, ApiError> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, chunk_stream.next_chunk())
            .await
            .map_err(|_| {
                ApiError::Timeout(format!("no data received for {} ms", limit.as_millis()))
            })?,
        None => chunk_stream.next_chunk().await,
    }
}

/// Decode a chunk stream into callback invocations.
///
/// Callbacks fire in the order their frames complete. The loop ends at the
/// first `done` frame, at end of body (which yields a `Done` carrying the last
/// seen conversation id), on cancellation, or on a transport error.
pub async fn process_chunk_stream(
    chunk_stream: &mut dyn ChunkStream,
    callback: &StreamingCallback,
    options: &StreamOptions,
    cancel: &CancellationToken,
) -> Result<StreamSummary, ApiError> {
    let mut state = StreamState::new(callback, options.stop_on_error);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream cancelled while waiting for data");
                return Ok(state.summary(EndReason::Cancelled));
            }
            next = read_chunk(chunk_stream, options.idle_timeout) => next,
        };

        let chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                report_transport_error(callback, &e);
                return Err(e);
            }
        };

        for block in state.buffer.push(&chunk) {
            if let Flow::Stop(end) = state.handle_block(&block) {
                info!(conversation_id = ?state.conversation_id, ?end, "Chat stream finished");
                return Ok(state.summary(end));
            }
            if cancel.is_cancelled() {
                return Ok(state.summary(EndReason::Cancelled));
            }
        }
    }

    if let Some(block) = state.buffer.finish() {
        if let Flow::Stop(end) = state.handle_block(&block) {
            return Ok(state.summary(end));
        }
        if cancel.is_cancelled() {
            return Ok(state.summary(EndReason::Cancelled));
        }
    }

    info!(conversation_id = ?state.conversation_id, "Chat stream ended without done frame");
    let end = match state.emit(StreamingChunk::Done {
        conversation_id: state.conversation_id.clone(),
    }) {
        Flow::Continue => EndReason::EndOfStream,
        Flow::Stop(end) => end,
    };
    Ok(state.summary(end))
}
