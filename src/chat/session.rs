//! Chat session controller
//!
//! A session owns the message list of one conversation about one article.
//! Sending moves the session through `Idle → Sending → Streaming → Idle`;
//! a cancelled stream returns to `Idle` with whatever text had arrived.
//! Edit and retry never mutate a message in place: they truncate the list
//! and send again.

use super::context::ArticleContext;
use crate::config::ChatSettings;
use crate::error::{Result, ReaderError};
use crate::providers::{CompletionClient, CompletionRequest, Message};
use crate::settings::ConfigHandle;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Suffix appended to a reply whose generation was stopped
pub const STOPPED_MARKER: &str = "\n\n*(已停止生成)*";

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready to send
    Idle,
    /// Request submitted, no response yet
    Sending,
    /// Receiving content deltas
    Streaming,
}

/// How a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream finished and the full reply was appended
    Completed,
    /// The request was cancelled; the partial reply was appended with the
    /// stopped marker
    Cancelled,
    /// The request failed; an `Error: …` message was appended
    Failed(String),
}

/// One conversation about one article
pub struct ChatSession {
    client: Arc<dyn CompletionClient>,
    config: ConfigHandle,
    settings: ChatSettings,
    context: ArticleContext,
    messages: Vec<Message>,
    state: SessionState,
}

impl ChatSession {
    /// Create an empty session
    pub fn new(
        client: Arc<dyn CompletionClient>,
        config: ConfigHandle,
        settings: ChatSettings,
        context: ArticleContext,
    ) -> Self {
        Self {
            client,
            config,
            settings,
            context,
            messages: Vec::new(),
            state: SessionState::Idle,
        }
    }

    /// Seed an empty session with the assistant greeting
    pub fn greet(&mut self) {
        if self.messages.is_empty() {
            self.messages
                .push(Message::assistant(self.context.greeting()));
        }
    }

    /// Messages in conversation order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send a user message and stream the reply
    ///
    /// `on_delta` is called with every content fragment as it arrives.
    /// Cancelling `cancel` stops the request and keeps the partial reply.
    ///
    /// # Errors
    ///
    /// Returns error without touching the conversation if the text is
    /// empty, a reply is already in progress, or no API key is configured.
    /// Request failures are not errors: they are appended as an
    /// `Error: …` assistant message.
    pub async fn send(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str),
    ) -> Result<SendOutcome> {
        self.check_sendable(text)?;
        self.messages.push(Message::user(text));
        Ok(self.submit(cancel, on_delta).await)
    }

    /// Replace the user message at `index` and everything after it
    ///
    /// # Errors
    ///
    /// Returns error if `index` is not a user message, or for any reason
    /// [`ChatSession::send`] would reject `text`
    pub async fn edit(
        &mut self,
        index: usize,
        text: &str,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str),
    ) -> Result<SendOutcome> {
        match self.messages.get(index) {
            Some(message) if message.is_user() => {}
            _ => {
                return Err(ReaderError::InvalidOperation(format!(
                    "Message {} is not a user message",
                    index
                ))
                .into())
            }
        }
        self.check_sendable(text)?;

        self.messages.truncate(index);
        self.messages.push(Message::user(text));
        Ok(self.submit(cancel, on_delta).await)
    }

    /// Regenerate the assistant message at `index`
    ///
    /// The nearest user message before `index` is sent again; it and
    /// everything after it are removed first.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is not an assistant message, no user message
    /// precedes it, or the session cannot send
    pub async fn retry(
        &mut self,
        index: usize,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str),
    ) -> Result<SendOutcome> {
        match self.messages.get(index) {
            Some(message) if message.is_assistant() => {}
            _ => {
                return Err(ReaderError::InvalidOperation(format!(
                    "Message {} is not an assistant message",
                    index
                ))
                .into())
            }
        }

        let user_index = self.messages[..index]
            .iter()
            .rposition(Message::is_user)
            .ok_or_else(|| {
                ReaderError::InvalidOperation(format!(
                    "No user message precedes message {}",
                    index
                ))
            })?;
        let text = self.messages[user_index].text();
        self.check_sendable(&text)?;

        self.messages.truncate(user_index);
        self.messages.push(Message::user(text));
        Ok(self.submit(cancel, on_delta).await)
    }

    /// Remove the message at `index`
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range or a reply is in progress
    pub fn delete(&mut self, index: usize) -> Result<Message> {
        if self.state != SessionState::Idle {
            return Err(ReaderError::InvalidOperation(
                "Cannot delete while a reply is in progress".into(),
            )
            .into());
        }
        if index >= self.messages.len() {
            return Err(ReaderError::InvalidOperation(format!(
                "Message {} does not exist",
                index
            ))
            .into());
        }
        Ok(self.messages.remove(index))
    }

    fn check_sendable(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ReaderError::InvalidOperation("Message is empty".into()).into());
        }
        if self.state != SessionState::Idle {
            return Err(ReaderError::InvalidOperation(
                "A reply is already in progress".into(),
            )
            .into());
        }
        if !self.config.config().has_api_key() {
            return Err(ReaderError::MissingApiKey.into());
        }
        Ok(())
    }

    /// Stream a reply to the current message list
    async fn submit(
        &mut self,
        cancel: &CancellationToken,
        mut on_delta: impl FnMut(&str),
    ) -> SendOutcome {
        self.state = SessionState::Sending;

        let config = self.config.config();
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::system(self.context.system_prompt(&self.settings)));
        messages.extend(self.messages.iter().cloned());

        let request = CompletionRequest::new(&config.chat_model, messages, self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        tracing::debug!(
            "Submitting chat request with {} messages",
            request.messages.len()
        );

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.client.stream(&config, request) => Some(result),
        };

        let mut deltas = match started {
            None => return self.finish_cancelled(String::new()),
            Some(Err(e)) => return self.finish_failed(e),
            Some(Ok(rx)) => rx,
        };

        self.state = SessionState::Streaming;
        let mut reply = String::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.finish_cancelled(reply),
                item = deltas.recv() => match item {
                    Some(Ok(delta)) => {
                        on_delta(&delta);
                        reply.push_str(&delta);
                    }
                    Some(Err(e)) => return self.finish_failed(e),
                    None => break,
                },
            }
        }

        tracing::debug!("Chat reply complete ({} chars)", reply.len());
        self.messages.push(Message::assistant(reply));
        self.state = SessionState::Idle;
        SendOutcome::Completed
    }

    fn finish_cancelled(&mut self, partial: String) -> SendOutcome {
        tracing::info!("Chat generation stopped by user");
        self.messages
            .push(Message::assistant(format!("{}{}", partial, STOPPED_MARKER)));
        self.state = SessionState::Idle;
        SendOutcome::Cancelled
    }

    fn finish_failed(&mut self, error: anyhow::Error) -> SendOutcome {
        let message = error.to_string();
        tracing::error!("Chat request failed: {}", message);
        self.messages
            .push(Message::assistant(format!("Error: {}", message)));
        self.state = SessionState::Idle;
        SendOutcome::Failed(message)
    }
}
