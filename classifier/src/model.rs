//! Language model client.
//!
//! The service only needs one capability from a model: turn a prompt into a
//! text reply. [`ChatCompletionsClient`] speaks the OpenAI-compatible
//! chat-completions protocol, which the `openai`, `huggingface` (router) and
//! `gemini` (OpenAI-compatible endpoint) providers all accept.

use crate::config::LlmConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from the language model client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The configured provider is not supported
    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    /// No API key was configured
    #[error("Missing API key for provider {0}")]
    MissingApiKey(String),

    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ResponseParseFailed(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Invalid API key
    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// The reply carried no message content
    #[error("Model returned an empty reply")]
    EmptyReply,
}

/// A text-in, text-out language model
pub trait LanguageModel: Send + Sync {
    /// Sends one user prompt and returns the reply text
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the call fails or the reply is unusable.
    fn complete(
        &self,
        prompt: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + '_>>;

    /// Model name, for logging
    fn name(&self) -> &str;
}

/// Default endpoint and model for a provider name
fn provider_defaults(provider: &str) -> Option<(&'static str, &'static str)> {
    match provider {
        "openai" => Some(("https://api.openai.com/v1", "gpt-4o-mini")),
        "huggingface" => Some((
            "https://router.huggingface.co/v1",
            "mistralai/Mistral-7B-Instruct-v0.2",
        )),
        "gemini" => Some((
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-1.5-flash",
        )),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl ChatCompletionsClient {
    /// Create a client for an explicit endpoint
    #[must_use]
    pub fn new(api_key: String, api_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Create a client from configuration, filling provider defaults
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnsupportedProvider`] for an unknown provider and
    /// [`ModelError::MissingApiKey`] if no key is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let (default_url, default_model) = provider_defaults(&config.provider)
            .ok_or_else(|| ModelError::UnsupportedProvider(config.provider.clone()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ModelError::MissingApiKey(config.provider.clone()))?;

        Ok(Self::new(
            api_key,
            config.base_url.as_deref().unwrap_or(default_url),
            config.model.as_deref().unwrap_or(default_model),
        ))
    }

    async fn chat(&self, prompt: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            max_tokens: 256,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<ChatResponse>()
                    .await
                    .map_err(|e| ModelError::ResponseParseFailed(e.to_string()))?;
                body.choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .filter(|content| !content.trim().is_empty())
                    .ok_or(ModelError::EmptyReply)
            },
            StatusCode::TOO_MANY_REQUESTS => Err(ModelError::RateLimited),
            StatusCode::UNAUTHORIZED => Err(ModelError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ModelError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LanguageModel for ChatCompletionsClient {
    fn complete(
        &self,
        prompt: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + '_>> {
        Box::pin(async move { self.chat(&prompt).await })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm(provider: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            api_key: api_key.map(str::to_string),
            model: None,
            base_url: None,
        }
    }

    #[test]
    fn provider_defaults_fill_endpoint_and_model() {
        let client = ChatCompletionsClient::from_config(&llm("huggingface", Some("hf_x"))).unwrap();

        assert_eq!(client.api_url, "https://router.huggingface.co/v1");
        assert_eq!(client.name(), "mistralai/Mistral-7B-Instruct-v0.2");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let error = ChatCompletionsClient::from_config(&llm("ollama", Some("k"))).unwrap_err();
        assert_eq!(error, ModelError::UnsupportedProvider("ollama".to_string()));
    }

    #[test]
    fn missing_key_is_rejected() {
        let error = ChatCompletionsClient::from_config(&llm("openai", None)).unwrap_err();
        assert_eq!(error, ModelError::MissingApiKey("openai".to_string()));
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "messages": [{ "role": "user", "content": "classify" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"category\":\"Billing\",\"sentiment\":\"Neutral\"}" } }]
            })))
            .mount(&server)
            .await;
        let client = ChatCompletionsClient::new("sk-test".to_string(), server.uri(), "gpt-4o-mini");

        let reply = client.complete("classify".to_string()).await.unwrap();

        assert_eq!(reply, "{\"category\":\"Billing\",\"sentiment\":\"Neutral\"}");
    }

    #[tokio::test]
    async fn maps_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let client = ChatCompletionsClient::new("k".to_string(), server.uri(), "m");

        assert_eq!(client.complete("p".into()).await, Err(ModelError::RateLimited));
        assert_eq!(
            client.complete("p".into()).await,
            Err(ModelError::ApiError {
                status: 503,
                message: "overloaded".to_string()
            })
        );
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;
        let client = ChatCompletionsClient::new("k".to_string(), server.uri(), "m");

        assert_eq!(client.complete("p".into()).await, Err(ModelError::EmptyReply));
    }
}
