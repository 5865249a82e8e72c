//! Vision model client: OpenAI-compatible chat completions with mixed
//! text/image content, used to read trade tables off rendered plan pages.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEFAULT_VISION_BASE_URL, DEFAULT_VISION_MODEL, DEFAULT_VISION_TIMEOUT_SECS};

/// Errors are `Clone` so the extraction loop can record a failure per batch
/// without consuming it.
#[derive(Error, Debug, Clone)]
pub enum VisionError {
    #[error("Cannot connect to vision endpoint at {0}")]
    Connection(String),

    #[error("Vision request timed out after {0}s")]
    Timeout(u64),

    #[error("Vision endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse vision response: {0}")]
    ResponseParsing(String),
}

/// One element of a multimodal user message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Embed PNG bytes as a base64 data URL.
    pub fn image_png(bytes: &[u8]) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{}", BASE64.encode(bytes)),
            },
        }
    }
}

/// A vision-capable chat model. One call per page batch.
pub trait VisionClient: Send + Sync {
    fn complete(&self, parts: &[ContentPart]) -> Result<String, VisionError>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpVisionClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpVisionClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client,
            timeout_secs,
        }
    }

    /// Default endpoint and model, API key from `VISION_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(
            DEFAULT_VISION_BASE_URL,
            DEFAULT_VISION_MODEL,
            std::env::var("VISION_API_KEY").ok(),
            DEFAULT_VISION_TIMEOUT_SECS,
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a [ContentPart],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl VisionClient for HttpVisionClient {
    fn complete(&self, parts: &[ContentPart]) -> Result<String, VisionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: parts,
            }],
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                VisionError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                VisionError::Timeout(self.timeout_secs)
            } else {
                VisionError::ResponseParsing(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| VisionError::ResponseParsing(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VisionError::ResponseParsing("empty choices array".into()))
    }
}

// ── Mocks for testing ──────────────────────────────────────

/// Returns the same response for every call.
pub struct MockVisionClient {
    response: String,
}

impl MockVisionClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl VisionClient for MockVisionClient {
    fn complete(&self, _parts: &[ContentPart]) -> Result<String, VisionError> {
        Ok(self.response.clone())
    }
}

/// Pops one scripted result per call; errs once the script runs out.
pub struct ScriptedVisionClient {
    script: std::sync::Mutex<std::collections::VecDeque<Result<String, VisionError>>>,
}

impl ScriptedVisionClient {
    pub fn new(script: Vec<Result<String, VisionError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
        }
    }
}

impl VisionClient for ScriptedVisionClient {
    fn complete(&self, _parts: &[ContentPart]) -> Result<String, VisionError> {
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        script
            .pop_front()
            .unwrap_or_else(|| Err(VisionError::ResponseParsing("script exhausted".into())))
    }
}
