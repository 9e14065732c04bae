//! Completion client trait and common message types
//!
//! This module defines the [`CompletionClient`] trait implemented by the HTTP
//! client for OpenAI-compatible endpoints, along with the message, content
//! part, and request structures shared by the OCR pipeline and the chat
//! session.

use crate::error::Result;
use crate::settings::ChatConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receiving end of a streamed completion
///
/// Each item is one incremental content delta, or the error that ended the
/// stream. The channel closes when the stream is complete.
pub type DeltaReceiver = mpsc::UnboundedReceiver<Result<String>>;

/// A single typed piece of multi-part message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
    /// Image reference for vision input
    ImageUrl {
        /// Image location, either a remote URL or a `data:` URL
        image_url: ImageUrl,
    },
}

/// Image location wrapper used by [`ContentPart::ImageUrl`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Remote URL or inline `data:` URL
    pub url: String,
}

/// Message content: either a plain string or a list of typed parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Multi-part content for vision input
    Parts(Vec<ContentPart>),
}

/// Message structure for conversation
///
/// Represents a message exchanged with the model. The role is one of
/// `system`, `user` or `assistant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: MessageContent,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use wxreader::providers::Message;
    ///
    /// let msg = Message::user("What is this article about?");
    /// assert_eq!(msg.role, "user");
    /// assert!(msg.is_user());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use wxreader::providers::Message;
    ///
    /// let msg = Message::assistant("Hello!");
    /// assert_eq!(msg.role, "assistant");
    /// assert_eq!(msg.text(), "Hello!");
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Creates a user message made of typed parts
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }

    /// Whether this message was written by the user
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    /// Whether this message was written by the assistant
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    /// Text of the message, with the text of every part concatenated
    ///
    /// Image parts contribute nothing.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.as_str(),
                    ContentPart::ImageUrl { .. } => "",
                })
                .collect(),
        }
    }

    /// Copy of the message with its content flattened to plain text
    pub fn flattened(&self) -> Self {
        Self {
            role: self.role.clone(),
            content: MessageContent::Text(self.text()),
        }
    }
}

/// Body of a `chat/completions` request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Conversation to complete
    pub messages: Vec<Message>,
    /// Output token cap
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Whether the response is streamed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl CompletionRequest {
    /// Creates a non-streaming request
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            temperature: None,
            stream: false,
        }
    }

    /// Sets the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Client for an OpenAI-compatible `chat/completions` endpoint
///
/// Connection settings are passed per call so that settings changes take
/// effect on the next request.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Performs a non-streaming completion and returns the reply text
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured, the request fails, or the
    /// endpoint answers with a non-success status
    async fn complete(&self, config: &ChatConfig, request: CompletionRequest) -> Result<String>;

    /// Starts a streaming completion
    ///
    /// Message content is flattened to plain text before submission.
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured, the request fails, or the
    /// endpoint answers with a non-success status. Errors after the stream
    /// has started are delivered through the returned receiver.
    async fn stream(&self, config: &ChatConfig, request: CompletionRequest)
        -> Result<DeltaReceiver>;
}
