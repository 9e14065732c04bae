//! Persisted chat-client settings and change notification
//!
//! The API endpoint, key and model names are stored as a single named JSON
//! entry in the data directory. Consumers do not read that entry directly;
//! they obtain a [`ConfigHandle`] from a shared [`ConfigProvider`], which
//! loads the entry once and notifies every other handle when one of them
//! publishes an update.

use crate::error::{Result, ReaderError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Name of the persisted settings entry
pub const SETTINGS_ENTRY: &str = "chat-config-v1";

const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const DEFAULT_OCR_MODEL: &str = "deepseek-ai/DeepSeek-OCR";
const DEFAULT_CHAT_MODEL: &str = "Qwen/Qwen3-8B";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_ocr_model() -> String {
    DEFAULT_OCR_MODEL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

/// Connection settings for the OpenAI-compatible endpoint
///
/// # Examples
///
/// ```
/// use wxreader::settings::ChatConfig;
///
/// let config = ChatConfig::default();
/// assert!(!config.has_api_key());
/// assert_eq!(config.completions_url(), "https://api.siliconflow.cn/v1/chat/completions");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: String,
    /// Base URL of the API, e.g. `https://host/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Vision model used for image text extraction
    #[serde(default = "default_ocr_model")]
    pub ocr_model: String,
    /// Model used for conversation
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            ocr_model: default_ocr_model(),
            chat_model: default_chat_model(),
        }
    }
}

impl ChatConfig {
    /// Return a copy with surrounding whitespace removed from every field
    pub fn trimmed(self) -> Self {
        Self {
            api_key: self.api_key.trim().to_string(),
            base_url: self.base_url.trim().to_string(),
            ocr_model: self.ocr_model.trim().to_string(),
            chat_model: self.chat_model.trim().to_string(),
        }
    }

    /// Whether an API key has been configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Full URL of the chat completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Apply a partial update, leaving unset fields untouched
    pub fn merged(mut self, update: &ChatConfigUpdate) -> Self {
        if let Some(key) = &update.api_key {
            self.api_key = key.clone();
        }
        if let Some(url) = &update.base_url {
            self.base_url = url.clone();
        }
        if let Some(model) = &update.ocr_model {
            self.ocr_model = model.clone();
        }
        if let Some(model) = &update.chat_model {
            self.chat_model = model.clone();
        }
        self.trimmed()
    }

    /// Key with everything but the last four characters masked
    pub fn masked_api_key(&self) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return "(not set)".to_string();
        }
        let visible: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{}", visible)
    }
}

/// Partial update of a [`ChatConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatConfigUpdate {
    /// New API key
    pub api_key: Option<String>,
    /// New base URL
    pub base_url: Option<String>,
    /// New OCR model
    pub ocr_model: Option<String>,
    /// New chat model
    pub chat_model: Option<String>,
}

/// File-backed storage for the settings entry
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store the entry inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", SETTINGS_ENTRY)),
        }
    }

    /// Location of the entry on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored settings, falling back to defaults
    ///
    /// A missing entry yields defaults silently; an unreadable or malformed
    /// entry yields defaults and logs the failure.
    pub fn load(&self) -> ChatConfig {
        if !self.path.exists() {
            return ChatConfig::default();
        }
        match std::fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| parse_stored(&raw))
        {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse chat config: {}", e);
                ChatConfig::default()
            }
        }
    }

    /// Persist the settings entry
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the file written
    pub fn save(&self, config: &ChatConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Parse a stored entry, migrating the legacy single-model layout
fn parse_stored(raw: &str) -> Result<ChatConfig> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| ReaderError::Config("settings entry is not a JSON object".into()))?;

    let has_split_models = obj.contains_key("ocrModel") || obj.contains_key("chatModel");
    if !has_split_models {
        if let Some(legacy) = obj.remove("model") {
            let model = legacy.as_str().unwrap_or_default().trim().to_string();
            tracing::info!("Migrating legacy single-model settings to chatModel={}", model);
            obj.insert("chatModel".into(), serde_json::Value::String(model));
            obj.insert("ocrModel".into(), serde_json::Value::String(default_ocr_model()));
        }
    }

    let config: ChatConfig = serde_json::from_value(value)?;
    Ok(config.trimmed())
}

/// A published settings change
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Handle that published the change
    pub source: Uuid,
    /// Settings after the change
    pub config: ChatConfig,
}

struct ProviderInner {
    store: Option<SettingsStore>,
    current: RwLock<ChatConfig>,
    tx: broadcast::Sender<ConfigChange>,
}

/// Shared owner of the current chat settings
///
/// Cloning is cheap; all clones see the same settings.
///
/// # Examples
///
/// ```
/// use wxreader::settings::{ChatConfig, ChatConfigUpdate, ConfigProvider};
///
/// let provider = ConfigProvider::in_memory(ChatConfig::default());
/// let editor = provider.subscribe();
/// let mut reader = provider.subscribe();
///
/// editor.update(ChatConfigUpdate {
///     api_key: Some("  sk-test  ".into()),
///     ..Default::default()
/// }).unwrap();
///
/// assert_eq!(reader.try_changed().unwrap().api_key, "sk-test");
/// ```
#[derive(Clone)]
pub struct ConfigProvider {
    inner: Arc<ProviderInner>,
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl ConfigProvider {
    /// Load settings from `store` once and share them
    pub fn new(store: SettingsStore) -> Self {
        let config = store.load();
        Self::build(Some(store), config)
    }

    /// Provider that never touches disk
    pub fn in_memory(config: ChatConfig) -> Self {
        Self::build(None, config)
    }

    fn build(store: Option<SettingsStore>, config: ChatConfig) -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self {
            inner: Arc::new(ProviderInner {
                store,
                current: RwLock::new(config),
                tx,
            }),
        }
    }

    /// Snapshot of the current settings
    pub fn current(&self) -> ChatConfig {
        self.inner
            .current
            .read()
            .map(|config| config.clone())
            .unwrap_or_default()
    }

    /// Register a new consumer
    pub fn subscribe(&self) -> ConfigHandle {
        ConfigHandle {
            id: Uuid::new_v4(),
            provider: self.clone(),
            rx: self.inner.tx.subscribe(),
        }
    }
}

/// A consumer's view of the shared settings
pub struct ConfigHandle {
    id: Uuid,
    provider: ConfigProvider,
    rx: broadcast::Receiver<ConfigChange>,
}

impl ConfigHandle {
    /// Identifier attached to changes this handle publishes
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the current settings
    pub fn config(&self) -> ChatConfig {
        self.provider.current()
    }

    /// Merge `update` into the settings, persist, then notify other handles
    ///
    /// The entry is written before any notification is sent. This handle
    /// never receives its own change.
    ///
    /// # Errors
    ///
    /// Returns error if the settings entry cannot be written
    pub fn update(&self, update: ChatConfigUpdate) -> Result<ChatConfig> {
        let updated = self.provider.current().merged(&update);

        if let Some(store) = &self.provider.inner.store {
            store.save(&updated)?;
        }

        if let Ok(mut guard) = self.provider.inner.current.write() {
            *guard = updated.clone();
        }

        // No receivers is fine: nobody else is listening yet.
        let _ = self.provider.inner.tx.send(ConfigChange {
            source: self.id,
            config: updated.clone(),
        });

        Ok(updated)
    }

    /// Wait for the next change published by another handle
    ///
    /// The handle keeps its provider, and with it the sender, alive, so this
    /// only stops waiting when a change arrives. Drop the future to stop
    /// listening. A lagging handle gets the current settings.
    pub async fn changed(&mut self) -> ChatConfig {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.source == self.id => continue,
                Ok(change) => return change.config,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Settings subscriber lagged by {} changes", skipped);
                    return self.provider.current();
                }
                Err(broadcast::error::RecvError::Closed) => return self.provider.current(),
            }
        }
    }

    /// Latest pending change from another handle, without waiting
    pub fn try_changed(&mut self) -> Option<ChatConfig> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(change) if change.source == self.id => continue,
                Ok(change) => latest = Some(change.config),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    latest = Some(self.provider.current());
                }
                Err(_) => return latest,
            }
        }
    }
}
