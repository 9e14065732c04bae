//! Provider module for wxreader
//!
//! This module contains the completion client abstraction, the HTTP client
//! for OpenAI-compatible endpoints, and the streamed response parser.

pub mod base;
pub mod openai;
pub mod sse;

pub use base::{
    CompletionClient, CompletionRequest, ContentPart, DeltaReceiver, ImageUrl, Message,
    MessageContent,
};
pub use openai::OpenAiClient;

use crate::config::Config;
use crate::error::{Result, ReaderError};
use crate::settings::ChatConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create the completion client described by `config`
///
/// # Errors
///
/// Returns error if HTTP client initialization fails
pub fn create_client(config: &Config) -> Result<Arc<dyn CompletionClient>> {
    let client = OpenAiClient::new(Duration::from_secs(config.chat.timeout_seconds))?;
    Ok(Arc::new(client))
}

/// Check that the endpoint accepts the configured key and chat model
///
/// Sends a one-token completion for the message `ping`.
///
/// # Errors
///
/// Returns error if no API key is configured or the endpoint rejects the
/// request
pub async fn ping(client: &dyn CompletionClient, config: &ChatConfig) -> Result<()> {
    if !config.has_api_key() {
        return Err(ReaderError::MissingApiKey.into());
    }

    let request = CompletionRequest::new(&config.chat_model, vec![Message::user("ping")], 1);
    client.complete(config, request).await?;
    tracing::info!("Connection test succeeded for model {}", config.chat_model);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::chat_config;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_ping_sends_minimal_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_json(serde_json::json!({
                "model": "Qwen/Qwen3-8B",
                "messages": [{"role": "user", "content": "ping"}],
                "max_tokens": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "p"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = chat_config(&server.uri());
        let client = create_client(&Config::default()).unwrap();
        ping(client.as_ref(), &config).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_reports_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                serde_json::json!({"error": {"message": "model not found"}}),
            ))
            .mount(&server)
            .await;

        let config = chat_config(&server.uri());
        let client = create_client(&Config::default()).unwrap();
        let err = ping(client.as_ref(), &config).await.unwrap_err();
        assert_eq!(err.to_string(), "model not found");
    }

    #[tokio::test]
    async fn test_ping_requires_key() {
        let client = create_client(&Config::default()).unwrap();
        let err = ping(client.as_ref(), &ChatConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API Key is missing");
    }
}
