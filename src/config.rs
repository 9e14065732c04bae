//! Configuration management for wxreader
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! The API credentials themselves are not part of this file; they live in
//! the persisted settings entry managed by [`crate::settings`].

use crate::error::{Result, ReaderError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for wxreader
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Article archive settings
    #[serde(default)]
    pub articles: ArticlesConfig,
    /// OCR pipeline settings
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Chat session settings
    #[serde(default)]
    pub chat: ChatSettings,
    /// Local storage settings (settings entry and OCR cache)
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Article archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlesConfig {
    /// Directory holding one subdirectory per article
    #[serde(default = "default_articles_root")]
    pub root: String,

    /// URL prefix under which article assets are published
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,

    /// Optional YAML asset mapping guide titles to image section anchors
    ///
    /// When unset the built-in mapping is used.
    #[serde(default)]
    pub guide_mapping: Option<String>,
}

fn default_articles_root() -> String {
    "public/articles".to_string()
}

fn default_public_prefix() -> String {
    "/articles".to_string()
}

impl Default for ArticlesConfig {
    fn default() -> Self {
        Self {
            root: default_articles_root(),
            public_prefix: default_public_prefix(),
            guide_mapping: None,
        }
    }
}

/// OCR pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Number of workers draining the image list
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum number of images processed per article
    #[serde(default = "default_max_images")]
    pub max_images: usize,

    /// Output token cap per OCR request
    #[serde(default = "default_ocr_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for OCR requests
    #[serde(default = "default_ocr_temperature")]
    pub temperature: f32,

    /// Cache entries older than this many days are removed on cleanup
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u64,

    /// Base URL of the page the images are resolved against
    ///
    /// Relative `src` values are joined onto the directory part of this URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_concurrency() -> usize {
    3
}

fn default_max_images() -> usize {
    100
}

fn default_ocr_max_tokens() -> u32 {
    1024
}

fn default_ocr_temperature() -> f32 {
    0.1
}

fn default_cache_ttl_days() -> u64 {
    7
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_images: default_max_images(),
            max_tokens: default_ocr_max_tokens(),
            temperature: default_ocr_temperature(),
            cache_ttl_days: default_cache_ttl_days(),
            base_url: None,
        }
    }
}

/// Chat session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Output token cap per chat request
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for chat requests
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    /// Characters of article text embedded in the system message
    #[serde(default = "default_article_context_chars")]
    pub article_context_chars: usize,

    /// Characters of OCR text embedded in the system message
    #[serde(default = "default_ocr_context_chars")]
    pub ocr_context_chars: usize,

    /// Seconds allowed for a non-streaming request
    ///
    /// Streaming replies use it as the idle timeout between chunks.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_chat_max_tokens() -> u32 {
    4096
}

fn default_chat_temperature() -> f32 {
    0.7
}

fn default_article_context_chars() -> usize {
    15_000
}

fn default_ocr_context_chars() -> usize {
    25_000
}

fn default_timeout_seconds() -> u64 {
    120
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_tokens: default_chat_max_tokens(),
            temperature: default_chat_temperature(),
            article_context_chars: default_article_context_chars(),
            ocr_context_chars: default_ocr_context_chars(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the settings entry and the OCR cache
    ///
    /// Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ReaderError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ReaderError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(root) = std::env::var("WXREADER_ARTICLES_DIR") {
            self.articles.root = root;
        }

        if let Ok(mapping) = std::env::var("WXREADER_GUIDE_MAPPING") {
            self.articles.guide_mapping = Some(mapping);
        }

        if let Ok(data_dir) = std::env::var("WXREADER_DATA_DIR") {
            self.storage.data_dir = Some(data_dir);
        }

        if let Ok(base_url) = std::env::var("WXREADER_PAGE_BASE_URL") {
            self.ocr.base_url = Some(base_url);
        }

        if let Ok(concurrency) = std::env::var("WXREADER_OCR_CONCURRENCY") {
            match concurrency.parse() {
                Ok(value) => self.ocr.concurrency = value,
                Err(_) => tracing::warn!(
                    "Ignoring invalid WXREADER_OCR_CONCURRENCY value: {}",
                    concurrency
                ),
            }
        }

        if let Ok(max_images) = std::env::var("WXREADER_OCR_MAX_IMAGES") {
            match max_images.parse() {
                Ok(value) => self.ocr.max_images = value,
                Err(_) => tracing::warn!(
                    "Ignoring invalid WXREADER_OCR_MAX_IMAGES value: {}",
                    max_images
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
        if let Some(dir) = &cli.articles_dir {
            self.articles.root = dir.clone();
        }
        if let Some(dir) = &cli.data_dir {
            self.storage.data_dir = Some(dir.clone());
        }
    }

    /// Resolve the directory used for local state
    ///
    /// # Errors
    ///
    /// Returns error if no directory is configured and the platform data
    /// directory cannot be determined
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(PathBuf::from(dir));
        }
        let proj_dirs = ProjectDirs::from("com", "wxreader", "wxreader")
            .ok_or_else(|| ReaderError::Config("Could not determine data directory".into()))?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.articles.root.trim().is_empty() {
            return Err(ReaderError::Config("articles.root cannot be empty".to_string()).into());
        }

        if self.ocr.concurrency == 0 {
            return Err(
                ReaderError::Config("ocr.concurrency must be greater than 0".to_string()).into(),
            );
        }

        if self.ocr.concurrency > 32 {
            return Err(ReaderError::Config(
                "ocr.concurrency must be less than or equal to 32".to_string(),
            )
            .into());
        }

        if self.ocr.max_images == 0 {
            return Err(
                ReaderError::Config("ocr.max_images must be greater than 0".to_string()).into(),
            );
        }

        if !(0.0..=2.0).contains(&self.ocr.temperature)
            || !(0.0..=2.0).contains(&self.chat.temperature)
        {
            return Err(
                ReaderError::Config("temperature must be between 0.0 and 2.0".to_string()).into(),
            );
        }

        if self.chat.timeout_seconds == 0 {
            return Err(ReaderError::Config(
                "chat.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if let Some(base) = &self.ocr.base_url {
            url::Url::parse(base).map_err(|e| {
                ReaderError::Config(format!("ocr.base_url is not a valid URL: {}", e))
            })?;
        }

        Ok(())
    }
}
