//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` wire format shared by OpenAI, Groq and
//! most hosted model endpoints. One instance covers one model variant; the
//! fallback chain holds several instances pointed at different models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::gateway::provider::{ChatPrompt, ReplyProvider};
use crate::{BanterError, Result};

/// Sampling temperature for chat replies.
const TEMPERATURE: f32 = 0.7;

/// Token cap keeping replies short enough for synthesis.
const MAX_TOKENS: u32 = 300;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    content: String,
}

/// HTTP provider for one model variant behind an OpenAI-compatible API.
pub struct OpenAiProvider {
    id: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Self {
            id: config.id.clone(),
            client: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn request_body<'a>(&'a self, prompt: &'a ChatPrompt) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &prompt.system,
                },
                WireMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl ReplyProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        debug!(model = %self.model, "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| BanterError::UpstreamError(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BanterError::UpstreamError(format!(
                "upstream returned {status}"
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BanterError::UpstreamError(format!("malformed response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| BanterError::UpstreamError("response contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SessionContext;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(&ProviderConfig::new(
            "https://api.groq.example/openai/v1/",
            "secret",
            "llama3-8b-8192",
        ))
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        assert_eq!(
            provider().endpoint,
            "https://api.groq.example/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_wire_shape() {
        let provider = provider();
        let prompt = ChatPrompt::assemble("what is rust?", &SessionContext::default());
        let body = serde_json::to_value(provider.request_body(&prompt)).unwrap();

        assert_eq!(body["model"], "llama3-8b-8192");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "what is rust?");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "id": "cmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "Rust is a systems language." } }
            ],
            "usage": { "total_tokens": 12 }
        }"#;

        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content,
            "Rust is a systems language."
        );
    }
}
