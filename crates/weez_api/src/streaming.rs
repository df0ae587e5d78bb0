//! Chunk sources for the streaming decode loop
//!
//! The decode loop reads from a [`ChunkStream`], which is either a live HTTP
//! response or a captured transcript played back chunk by chunk. Both go
//! through identical decoding, so a transcript captured from a misbehaving
//! backend reproduces the exact callback sequence offline.

use crate::types::ApiError;
use async_trait::async_trait;
use reqwest::Response;
use std::collections::VecDeque;
use std::time::Duration;

/// Source of raw response body chunks
#[async_trait]
pub trait ChunkStream: Send {
    /// Next chunk, or `None` once the body has ended
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError>;
}

/// Live HTTP response body
pub struct HttpChunkStream {
    response: Response,
}

impl HttpChunkStream {
    pub fn new(response: Response) -> Self {
        Self { response }
    }
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        match self.response.chunk().await {
            Ok(Some(chunk)) => Ok(Some(chunk.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(ApiError::NetworkError(format!("HTTP chunk error: {e}"))),
        }
    }
}

/// Pre-captured chunks, optionally paced
pub struct PlaybackChunkStream {
    chunks: VecDeque<Vec<u8>>,
    delay: Option<Duration>,
}

impl PlaybackChunkStream {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            delay: None,
        }
    }

    /// Split a transcript into chunks of `chunk_size` bytes (0 keeps it whole)
    pub fn from_transcript(transcript: &[u8], chunk_size: usize) -> Self {
        let chunks = if chunk_size == 0 || transcript.is_empty() {
            vec![transcript.to_vec()]
        } else {
            transcript
                .chunks(chunk_size)
                .map(<[u8]>::to_vec)
                .collect()
        };
        Self::new(chunks)
    }

    /// Wait this long before handing out each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl ChunkStream for PlaybackChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        if self.chunks.is_empty() {
            return Ok(None);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.chunks.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transcript_is_split_into_fixed_chunks() {
        let mut stream = PlaybackChunkStream::from_transcript(b"abcdefg", 3);
        assert_eq!(stream.remaining(), 3);
        assert_eq!(stream.next_chunk().await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(stream.next_chunk().await.unwrap(), Some(b"def".to_vec()));
        assert_eq!(stream.next_chunk().await.unwrap(), Some(b"g".to_vec()));
        assert_eq!(stream.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_keeps_transcript_whole() {
        let mut stream = PlaybackChunkStream::from_transcript(b"abc", 0);
        assert_eq!(stream.next_chunk().await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(stream.next_chunk().await.unwrap(), None);
    }
}
