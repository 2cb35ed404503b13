//! Outbound client for the text-generation provider.
//!
//! One POST per call, no retries and no client-side timeout.  The provider's
//! reply is returned as untyped text; turning it into a question is the job
//! of [`crate::validate`].

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider returned status {status}")]
    Status { status: u16 },
    #[error("provider request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("provider response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait::async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Send `prompt` and return the concatenated text of the reply.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Connection settings for the messages API.
#[derive(Clone)]
pub struct ProviderSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl ProviderSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic messages API client.
pub struct AnthropicClient {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(settings: ProviderSettings) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("quizgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GenerationError::Transport)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

fn collect_text(resp: MessagesResponse) -> String {
    resp.content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait::async_trait]
impl QuestionGenerator for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .client
            .post(&self.settings.endpoint)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(GenerationError::Transport)?;

        let status = resp.status();
        let raw = resp.text().await.map_err(GenerationError::Transport)?;
        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                body = %raw,
                "generation provider returned an error"
            );
            return Err(GenerationError::Status {
                status: status.as_u16(),
            });
        }
        let parsed: MessagesResponse =
            serde_json::from_str(&raw).map_err(|e| GenerationError::Decode(e.to_string()))?;
        let text = collect_text(parsed);
        tracing::debug!(chars = text.chars().count(), "generation provider replied");
        Ok(text)
    }
}
