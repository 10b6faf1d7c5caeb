//! Gemini REST backend with server-sent-event streaming.
//!
//! Calls `{base_url}/{model}:streamGenerateContent?alt=sse` directly; the
//! system prompt travels as `systemInstruction` and the session history as
//! alternating `user` / `model` contents. The key goes in the
//! `x-goog-api-key` header and never appears in a URL.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use mriga_core::config::LlmConfig;
use mriga_core::types::Speaker;

use crate::error::LlmError;
use crate::session::{ChatBackend, ChatRequest, ChunkStream, TextChunk};
use crate::sse::SseLineParser;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Checked when the configured key variable is unset.
const FALLBACK_KEY_ENV: &str = "API_KEY";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// [`ChatBackend`] that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Build from configuration, reading the key from the environment.
    ///
    /// Fails with [`LlmError::MissingApiKey`] when neither the configured
    /// variable nor `API_KEY` is set, so the binary can report it at startup.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = resolve_api_key(&config.api_key_env, |name| std::env::var(name).ok())?;
        let model = if config.model.trim().is_empty() {
            DEFAULT_GEMINI_MODEL.to_string()
        } else {
            config.model.clone()
        };
        Ok(Self::new(api_key, model).with_base_url(&config.base_url))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_reply(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        let body = GenerateContentRequest::from_chat(&request);

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                LlmError::Request(format!("Gemini API request failed: {}", err.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        tracing::debug!(model = %self.model, "Gemini stream opened");
        Ok(Box::pin(chunk_stream(response.bytes_stream())))
    }
}

/// Pick the API key from `primary`, then from the fallback variable.
fn resolve_api_key(
    primary: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, LlmError> {
    [primary, FALLBACK_KEY_ENV]
        .into_iter()
        .filter(|name| !name.is_empty())
        .find_map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
        .ok_or_else(|| LlmError::MissingApiKey(primary.to_string()))
}

// =============================================================================
// Stream decoding
// =============================================================================

struct StreamState {
    bytes: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseLineParser,
    pending: VecDeque<Result<TextChunk, LlmError>>,
    exhausted: bool,
}

impl StreamState {
    fn queue(&mut self, data: &str) {
        if let Some(item) = decode_event(data) {
            self.pending.push_back(item);
        }
    }
}

fn chunk_stream(
    bytes: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<TextChunk, LlmError>> + Send {
    let state = StreamState {
        bytes: Box::pin(bytes),
        parser: SseLineParser::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    // Terminal: drop anything decoded after the failure.
                    state.pending.clear();
                    state.exhausted = true;
                }
                return Some((item, state));
            }
            if state.exhausted {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in state.parser.push(&chunk) {
                        if !event.is_done() {
                            state.queue(&event.data);
                        }
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(LlmError::Stream(format!("Gemini stream read error: {}", e.without_url()))));
                }
                None => {
                    if let Some(event) = state.parser.flush() {
                        if !event.is_done() {
                            state.queue(&event.data);
                        }
                    }
                    state.exhausted = true;
                }
            }
        }
    })
}

/// Decode one SSE `data:` payload into a fragment, an error, or nothing.
fn decode_event(data: &str) -> Option<Result<TextChunk, LlmError>> {
    let parsed: StreamResponse = match serde_json::from_str(data) {
        Ok(parsed) => parsed,
        Err(e) => return Some(Err(LlmError::Decode(format!("{e}: {data}")))),
    };

    if let Some(error) = parsed.error {
        return Some(Err(LlmError::Http {
            status: error.code.unwrap_or(500),
            message: error.describe(),
        }));
    }

    let text: String = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Some(Err(LlmError::Http {
                status: 400,
                message: format!("prompt blocked: {reason}"),
            }));
        }
        return None;
    }
    Some(Ok(TextChunk::new(text)))
}

fn map_http_error(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or_else(|_| body.to_string());
    LlmError::Http {
        status: status.as_u16(),
        message,
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

impl GenerateContentRequest {
    fn from_chat(request: &ChatRequest) -> Self {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| Content::new(turn.speaker, &turn.text))
            .collect();
        contents.push(Content::new(Speaker::User, &request.message));

        let system_instruction = if request.system_prompt.trim().is_empty() {
            None
        } else {
            Some(SystemInstruction {
                parts: vec![Part {
                    text: request.system_prompt.clone(),
                }],
            })
        };

        Self {
            contents,
            system_instruction,
        }
    }
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

impl Content {
    fn new(speaker: Speaker, text: &str) -> Self {
        let role = match speaker {
            Speaker::User => "user",
            Speaker::Assistant => "model",
        };
        Self {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        let msg = self.message.clone().unwrap_or_default();
        match self.status.as_deref() {
            Some(status) if !status.is_empty() => format!("{status}: {msg}"),
            _ => msg,
        }
    }
}
