//! Language-model agent collaborator
//!
//! The agent consumes one user utterance and yields a lazy stream of text
//! tokens. `ChatAgent` talks to any OpenAI-compatible chat completions
//! endpoint with `stream: true` and surfaces the SSE deltas as the token
//! stream.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use crate::config::BackendConfig;
use crate::{Error, Result};

/// Lazy stream of response tokens
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Produces a streamed response to a user utterance
#[async_trait]
pub trait Agent: Send + Sync {
    /// Respond to an utterance with a lazy token stream
    ///
    /// The backend may run auxiliary work before yielding the first token.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started
    async fn respond(&self, utterance: &str) -> Result<TokenStream>;
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(serde::Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the content delta from one SSE line, if any
fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|t| !t.is_empty()),
        Err(e) => {
            tracing::trace!(error = %e, "skipping unparseable SSE line");
            None
        }
    }
}

/// Drain complete lines from the SSE buffer, returning their tokens
fn drain_sse_lines(buf: &mut String) -> Vec<String> {
    let mut tokens = Vec::new();
    while let Some(pos) = buf.find('\n') {
        let line: String = buf.drain(..=pos).collect();
        if let Some(token) = parse_sse_line(line.trim()) {
            tokens.push(token);
        }
    }
    tokens
}

/// Agent backed by an OpenAI-compatible streaming chat endpoint
pub struct ChatAgent {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl ChatAgent {
    /// Create an agent from backend configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(backend: &BackendConfig) -> Result<Self> {
        if backend.api_key.is_empty() {
            return Err(Error::Config("API key required for agent".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base: backend.api_base.clone(),
            api_key: backend.api_key.clone(),
            model: backend.model.clone(),
            system_prompt: backend.system_prompt.clone(),
            max_tokens: backend.max_tokens,
        })
    }
}

#[async_trait]
impl Agent for ChatAgent {
    async fn respond(&self, utterance: &str) -> Result<TokenStream> {
        tracing::debug!(model = %self.model, "requesting agent response");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: utterance,
                },
            ],
            stream: true,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!("chat API error {status}: {body}")));
        }

        let mut line_buf = String::new();
        let tokens = response
            .bytes_stream()
            .map(move |chunk| -> Result<Vec<String>> {
                let chunk = chunk?;
                line_buf.push_str(&String::from_utf8_lossy(&chunk));
                Ok(drain_sse_lines(&mut line_buf))
            })
            .map(|result| match result {
                Ok(tokens) => stream::iter(tokens.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::iter(vec![Err(e)]).right_stream(),
            })
            .flatten()
            .boxed();

        Ok(tokens)
    }
}
