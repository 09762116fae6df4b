use serde::Deserialize;

use super::{CompletionProvider, CompletionRequest, ProviderError};

/// Client for an OpenAI-compatible `/chat/completions` endpoint (Groq by
/// default). The HTTP client keeps reqwest's default timeouts.
pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl GroqProvider {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("verdict/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pull the provider's own message out of an error body, falling back to the
/// raw text.
fn error_message(status: reqwest::StatusCode, text: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(envelope) => envelope.error.message,
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown provider error")
            .to_string(),
    }
}

fn extract_content(resp: CompletionResponse) -> Result<String, ProviderError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty())
        .ok_or(ProviderError::EmptyCompletion)
}

#[async_trait::async_trait]
impl CompletionProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        if !status.is_success() {
            tracing::warn!(provider = "groq", status = status.as_u16(), "completion request rejected");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|err| {
            tracing::warn!(provider = "groq", error = %err, "unparseable completion body");
            ProviderError::EmptyCompletion
        })?;
        extract_content(parsed)
    }
}
