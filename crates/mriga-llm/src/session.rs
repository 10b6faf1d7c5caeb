//! Chat sessions and the backend seam.
//!
//! The remote API is stateless, so a [`ChatSession`] carries the turn history
//! itself. Only exchanges whose stream completed normally are remembered.

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use mriga_core::types::Speaker;

use crate::error::LlmError;

/// One incremental fragment of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
}

impl TextChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Reply stream: ordered fragments, terminated either by `None` or by exactly
/// one `Err` item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<TextChunk, LlmError>> + Send>>;

/// A completed exchange entry in a session's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

/// Everything a backend needs to produce one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub message: String,
}

/// A remote model that can stream a reply to one request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Send the request and return the reply stream once the remote side has
    /// accepted it.
    async fn stream_reply(&self, request: ChatRequest) -> Result<ChunkStream, LlmError>;
}

/// Factory for chat sessions over one backend.
#[derive(Clone)]
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Open a fresh conversation bound to `system_prompt`.
    ///
    /// Every call allocates a new session with an empty history.
    pub fn create_session(&self, system_prompt: &str) -> ChatSession {
        let session = ChatSession {
            id: Uuid::new_v4(),
            system_prompt: system_prompt.to_string(),
            history: Arc::new(Mutex::new(Vec::new())),
            backend: Arc::clone(&self.backend),
        };
        tracing::debug!(session_id = %session.id, backend = self.backend.name(), "Chat session created");
        session
    }
}

/// One logical conversation with the remote model.
pub struct ChatSession {
    id: Uuid,
    system_prompt: String,
    history: Arc<Mutex<Vec<Turn>>>,
    backend: Arc<dyn ChatBackend>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .field("turns", &self.history().len())
            .finish()
    }
}

impl ChatSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Completed turns so far, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        snapshot(&self.history)
    }

    /// Send one user message and stream the reply.
    ///
    /// Nothing is sent until the returned stream is first polled. The stream
    /// is single-use; once it ends normally the exchange is added to the
    /// session history.
    pub fn send_message_streaming(&self, text: &str) -> ChunkStream {
        let backend = Arc::clone(&self.backend);
        let history = Arc::clone(&self.history);
        let system_prompt = self.system_prompt.clone();
        let message = text.to_string();
        let session_id = self.id;

        let opened = stream::once(async move {
            let request = ChatRequest {
                system_prompt,
                history: snapshot(&history),
                message: message.clone(),
            };
            tracing::debug!(%session_id, history_turns = request.history.len(), "Sending chat message");
            match backend.stream_reply(request).await {
                Ok(inner) => Box::pin(record_on_completion(inner, history, message)) as ChunkStream,
                Err(e) => Box::pin(stream::once(async move { Err::<TextChunk, _>(e) })) as ChunkStream,
            }
        })
        .flatten();

        Box::pin(opened)
    }
}

fn snapshot(history: &Mutex<Vec<Turn>>) -> Vec<Turn> {
    match history.lock() {
        Ok(turns) => turns.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

struct Recorder {
    inner: ChunkStream,
    history: Arc<Mutex<Vec<Turn>>>,
    message: String,
    reply: String,
    finished: bool,
}

impl Recorder {
    fn commit(&mut self) {
        let mut turns = match self.history.lock() {
            Ok(turns) => turns,
            Err(poisoned) => poisoned.into_inner(),
        };
        turns.push(Turn {
            speaker: Speaker::User,
            text: std::mem::take(&mut self.message),
        });
        turns.push(Turn {
            speaker: Speaker::Assistant,
            text: std::mem::take(&mut self.reply),
        });
    }
}

/// Pass fragments through, stop after the first error, and remember the
/// exchange when the inner stream ends cleanly.
fn record_on_completion(
    inner: ChunkStream,
    history: Arc<Mutex<Vec<Turn>>>,
    message: String,
) -> impl Stream<Item = Result<TextChunk, LlmError>> + Send {
    let recorder = Recorder {
        inner,
        history,
        message,
        reply: String::new(),
        finished: false,
    };
    stream::unfold(recorder, |mut rec| async move {
        if rec.finished {
            return None;
        }
        match rec.inner.next().await {
            Some(Ok(chunk)) => {
                rec.reply.push_str(&chunk.text);
                Some((Ok(chunk), rec))
            }
            Some(Err(e)) => {
                rec.finished = true;
                Some((Err(e), rec))
            }
            None => {
                rec.finished = true;
                rec.commit();
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedBackend, ScriptedReply};

    async fn collect(stream: ChunkStream) -> Vec<Result<TextChunk, LlmError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_chunks_concatenate_in_order() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply(ScriptedReply::complete(&["Na", "mas", "te"]));
        let client = ChatClient::new(backend);
        let session = client.create_session("You are Rajeev.");

        let items = collect(session.send_message_streaming("hello")).await;
        let text: String = items
            .into_iter()
            .map(|item| item.unwrap().text)
            .collect();
        assert_eq!(text, "Namaste");
    }

    #[tokio::test]
    async fn test_completed_exchange_is_recorded() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply(ScriptedReply::complete(&["first ", "reply"]));
        backend.push_reply(ScriptedReply::complete(&["second"]));
        let client = ChatClient::new(backend.clone());
        let session = client.create_session("prompt");

        collect(session.send_message_streaming("one")).await;
        assert_eq!(
            session.history(),
            vec![
                Turn {
                    speaker: Speaker::User,
                    text: "one".to_string()
                },
                Turn {
                    speaker: Speaker::Assistant,
                    text: "first reply".to_string()
                },
            ]
        );

        collect(session.send_message_streaming("two")).await;
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].system_prompt, "prompt");
        assert_eq!(requests[1].message, "two");
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_exchange_is_not_recorded() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply(ScriptedReply::fail_after(&["a", "b", "c"], 2));
        let session = ChatClient::new(backend).create_session("prompt");

        let items = collect(session.send_message_streaming("hi")).await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(LlmError::Stream(_))));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_is_single_terminal_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply(ScriptedReply::fail_on_open());
        let session = ChatClient::new(backend).create_session("prompt");

        let items = collect(session.send_message_streaming("hi")).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let backend = Arc::new(ScriptedBackend::new());
        let session = ChatClient::new(backend.clone()).create_session("prompt");

        let stream = session.send_message_streaming("not yet");
        assert!(backend.requests().is_empty());
        drop(stream);
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn test_each_session_is_fresh() {
        let client = ChatClient::new(Arc::new(ScriptedBackend::new()));
        let a = client.create_session("p");
        let b = client.create_session("p");
        assert_ne!(a.id(), b.id());
        assert!(a.history().is_empty());
        assert_eq!(b.system_prompt(), "p");
    }
}
