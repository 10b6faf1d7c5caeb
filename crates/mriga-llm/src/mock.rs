//! Scripted chat backend.
//!
//! Used for tests and for the binary's offline mode. Replies are consumed
//! from a queue; once it is empty the backend echoes the user's message word
//! by word.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::error::LlmError;
use crate::session::{ChatBackend, ChatRequest, ChunkStream, TextChunk};

/// How a scripted reply terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEnding {
    /// All chunks, then a normal end.
    Complete,
    /// The first `n` chunks, then a stream error.
    FailAfter(usize),
    /// The first `n` chunks, then the stream never yields again.
    StallAfter(usize),
    /// `stream_reply` itself fails.
    FailOnOpen,
}

/// One queued reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    pub chunks: Vec<String>,
    pub ending: ReplyEnding,
}

impl ScriptedReply {
    pub fn complete(chunks: &[&str]) -> Self {
        Self::with_ending(chunks, ReplyEnding::Complete)
    }

    pub fn fail_after(chunks: &[&str], delivered: usize) -> Self {
        Self::with_ending(chunks, ReplyEnding::FailAfter(delivered))
    }

    pub fn stall_after(chunks: &[&str], delivered: usize) -> Self {
        Self::with_ending(chunks, ReplyEnding::StallAfter(delivered))
    }

    pub fn fail_on_open() -> Self {
        Self::with_ending(&[], ReplyEnding::FailOnOpen)
    }

    fn with_ending(chunks: &[&str], ending: ReplyEnding) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending,
        }
    }

    fn echo(message: &str) -> Self {
        let mut chunks = vec!["You said:".to_string()];
        chunks.extend(message.split_whitespace().map(|w| format!(" {w}")));
        Self {
            chunks,
            ending: ReplyEnding::Complete,
        }
    }
}

/// Deterministic [`ChatBackend`] with a reply queue and a request log.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    chunk_delay: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between chunks, to make streaming visible.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, message: &str) -> ScriptedReply {
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| ScriptedReply::echo(message))
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_reply(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        let reply = self.next_reply(&request.message);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let (delivered, tail): (usize, ChunkStream) = match reply.ending {
            ReplyEnding::FailOnOpen => {
                return Err(LlmError::Request("scripted connection failure".to_string()))
            }
            ReplyEnding::Complete => (reply.chunks.len(), Box::pin(stream::empty::<Result<TextChunk, LlmError>>())),
            ReplyEnding::FailAfter(n) => (
                n,
                Box::pin(stream::once(async {
                    Err::<TextChunk, _>(LlmError::Stream("scripted stream failure".to_string()))
                })),
            ),
            ReplyEnding::StallAfter(n) => (n, Box::pin(stream::pending::<Result<TextChunk, LlmError>>())),
        };

        let delay = self.chunk_delay;
        let head = stream::iter(reply.chunks.into_iter().take(delivered)).then(move |text| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, LlmError>(TextChunk::new(text))
        });
        tracing::trace!(delivered, ending = ?reply.ending, "Scripted reply opened");

        Ok(Box::pin(head.chain(tail)))
    }
}
