use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::error::CompletionError;

/// External text-completion collaborator.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    /// Local Ollama server (`/api/generate`).
    Ollama,
    /// OpenAI-compatible chat completions endpoint.
    Openai,
}

// Structures matching Ollama's /api/generate endpoint
#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool, // We want the full response, not a stream
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, CompletionError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, "Sending Ollama generate request");

        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|source| CompletionError::Request {
                url: url.clone(),
                source,
            })?;

        let body = read_success(response).await?;
        let parsed = body
            .json::<OllamaResponse>()
            .await
            .map_err(CompletionError::Decode)?;

        non_empty(parsed.response)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize, Debug)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, CompletionError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(%url, "Sending chat completion request");

        let mut request = self.client.post(&url).json(&ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| CompletionError::Request {
                url: url.clone(),
                source,
            })?;

        let parsed = read_success(response)
            .await?
            .json::<ChatResponse>()
            .await
            .map_err(CompletionError::Decode)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(content)
    }
}

async fn read_success(response: reqwest::Response) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    error!(%status, %body, "Model API request failed");
    Err(CompletionError::Status { status, body })
}

/// Passes the completion through untouched unless it is blank.
fn non_empty(text: String) -> Result<String, CompletionError> {
    if text.trim().is_empty() {
        return Err(CompletionError::Empty);
    }
    debug!(chars = text.len(), "Received model response");
    Ok(text)
}

/// Picks the client for `provider`.
pub fn build_backend(
    provider: Provider,
    ollama_url: &str,
    openai_url: &str,
    openai_key: &str,
) -> Arc<dyn CompletionBackend> {
    match provider {
        Provider::Ollama => Arc::new(OllamaClient::new(ollama_url)),
        Provider::Openai => Arc::new(OpenAiClient::new(openai_url, openai_key)),
    }
}
