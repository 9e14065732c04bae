//! HTTP client for OpenAI-compatible chat completion endpoints
//!
//! Requests are sent to `POST {baseUrl}/chat/completions` with a bearer
//! token. Non-success answers are turned into [`ReaderError::Api`] with the
//! most specific message the error body offers.

use crate::error::{Result, ReaderError};
use crate::providers::sse::parse_completion_stream;
use crate::providers::{CompletionClient, CompletionRequest, DeltaReceiver, Message};
use crate::settings::ChatConfig;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

/// Client for OpenAI-compatible endpoints
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use wxreader::providers::{CompletionClient, CompletionRequest, Message, OpenAiClient};
/// use wxreader::settings::ChatConfig;
///
/// # async fn example() -> wxreader::error::Result<()> {
/// let client = OpenAiClient::new(Duration::from_secs(120))?;
/// let config = ChatConfig {
///     api_key: "sk-...".to_string(),
///     ..Default::default()
/// };
/// let request = CompletionRequest::new(&config.chat_model, vec![Message::user("Hi")], 64);
/// let reply = client.complete(&config, request).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    timeout: Duration,
}

impl OpenAiClient {
    /// Create a new client
    ///
    /// `timeout` bounds connecting and a whole non-streaming request. For
    /// streaming it bounds the wait for the response headers and each gap
    /// between body chunks, never the full length of a reply.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("wxreader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReaderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    async fn post(&self, config: &ChatConfig, request: &CompletionRequest) -> Result<reqwest::Response> {
        if !config.has_api_key() {
            return Err(ReaderError::MissingApiKey.into());
        }

        let url = config.completions_url();
        tracing::debug!(
            "Sending completion request: url={}, model={}, messages={}, stream={}",
            url,
            request.model,
            request.messages.len(),
            request.stream
        );

        let builder = self
            .client
            .post(&url)
            .bearer_auth(config.api_key.trim())
            .json(request);
        let sent = if request.stream {
            match tokio::time::timeout(self.timeout, builder.send()).await {
                Ok(sent) => sent,
                Err(_) => {
                    tracing::error!("No response headers within {}s", self.timeout.as_secs());
                    return Err(ReaderError::StreamStalled(self.timeout.as_secs()).into());
                }
            }
        } else {
            builder.timeout(self.timeout).send().await
        };
        let response = sent.map_err(|e| {
            tracing::error!("Completion request failed: {}", e);
            ReaderError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = api_error(status, &body);
            tracing::error!("Completion endpoint returned {}: {}", status, error);
            return Err(error.into());
        }

        Ok(response)
    }
}

/// Build an [`ReaderError::Api`] from a failed response
///
/// The message is taken from `message` or `error.message` in a JSON body,
/// falling back to the status line. A 401 gets a hint about the API key.
fn api_error(status: reqwest::StatusCode, body: &str) -> ReaderError {
    let fallback = format!("API Error: {}", status);
    let mut message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value["message"]
                .as_str()
                .or_else(|| value["error"]["message"].as_str())
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        })
        .unwrap_or(fallback);

    if status == reqwest::StatusCode::UNAUTHORIZED {
        message = format!(
            "Unauthorized (401): Please check if your API Key is correct. {}",
            message
        );
    }

    ReaderError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, config: &ChatConfig, request: CompletionRequest) -> Result<String> {
        let response = self.post(config, &request).await?;

        let value: serde_json::Value = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse completion response: {}", e);
            ReaderError::Http(e)
        })?;

        Ok(value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn stream(
        &self,
        config: &ChatConfig,
        mut request: CompletionRequest,
    ) -> Result<DeltaReceiver> {
        request.stream = true;
        request.messages = request.messages.iter().map(Message::flattened).collect();

        let response = self.post(config, &request).await?;

        let (delta_tx, delta_rx) = mpsc::unbounded_channel();
        tokio::spawn(parse_completion_stream(
            response.bytes_stream(),
            delta_tx,
            self.timeout,
        ));

        Ok(delta_rx)
    }
}
