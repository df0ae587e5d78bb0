//! Client-side protocol engines for the Weez content services
//!
//! This crate implements:
//! - Server-Sent-Events chat streaming with tolerance for both historical message shapes
//! - A buffered chat fallback and a health probe
//! - Progress polling for server-side background jobs, in a quiet and a strict variant
//! - Status and duration formatting shared by everything that renders job state
//! - Client configuration loading


mod utils;

pub mod chat;
pub mod config;
pub mod events;
pub mod framing;
pub mod job;
pub mod jobs;
pub mod poller;
pub mod status;
pub mod streaming;
pub mod types;

pub use chat::{ChatClient, EndReason, StreamOptions, StreamSummary};
pub use config::ClientConfig;
pub use job::{JobStatus, ProcessingJob};
pub use jobs::JobsClient;
pub use poller::{JobProgressPoller, JobStatusSource, PollError, PollHandle, PollOptions};
pub use types::*;

use anyhow::Result;

/// Which layer an error reported through [`StreamingChunk::Error`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server sent an `error` frame; the stream may continue
    Protocol,
    /// Connection, status or body failure; the stream is over
    Transport,
}

/// Events delivered to the caller while a chat response streams in
#[derive(Debug, Clone, PartialEq)]
pub enum StreamingChunk {
    /// One decoded token frame, never coalesced with its neighbours
    Token { content: String },
    Error { kind: ErrorKind, message: String },
    /// Fired once, carrying the last conversation id seen on the stream
    Done { conversation_id: Option<String> },
}

/// Returning `Err` from the callback stops the stream.
pub type StreamingCallback = Box<dyn Fn(&StreamingChunk) -> Result<()> + Send + Sync>;
