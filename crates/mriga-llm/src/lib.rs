//! Remote chat backend for Mriga.
//!
//! A [`ChatSession`] binds one system prompt to one remote conversation and
//! exposes a lazily evaluated, single-use stream of reply fragments. The
//! network side sits behind the [`ChatBackend`] trait so the conversation
//! layer can be driven by the scripted backend in tests.

pub mod error;
pub mod gemini;
pub mod mock;
pub mod session;
pub mod sse;

pub use error::LlmError;
pub use gemini::GeminiBackend;
pub use mock::{ReplyEnding, ScriptedBackend, ScriptedReply};
pub use session::{ChatBackend, ChatClient, ChatRequest, ChatSession, ChunkStream, TextChunk, Turn};
