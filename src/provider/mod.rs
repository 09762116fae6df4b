//! Completion provider abstraction.
//!
//! A provider turns a list of chat messages plus fixed sampling parameters
//! into completion text, or fails with an error that may carry an HTTP-like
//! status. Exactly one call is made per analysis; there is no retry layer.

use serde::Serialize;

pub mod groq;

pub use self::groq::GroqProvider;

/// Model identifier sent with every completion request.
pub const MODEL: &str = "llama-3.3-70b-versatile";
pub const TEMPERATURE: f64 = 0.7;
pub const MAX_TOKENS: u32 = 2000;
pub const TOP_P: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Wire shape of a chat-completion request. Only `messages` varies.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: &'static str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stream: bool,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            model: MODEL,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: TOP_P,
            stream: false,
            stop: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// The provider answered 2xx but without usable completion text.
    #[error("Invalid response from GROQ API")]
    EmptyCompletion,
    #[error("provider request failed: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}
