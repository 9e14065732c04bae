//! Command handlers for wxreader
//!
//! Each subcommand lives in its own module. The helpers here wire the
//! library components together from a loaded [`Config`]: the article
//! repository, the persisted API settings, the OCR cache and the OCR
//! pipeline.

use crate::articles::{ArticleData, ArticleRepository};
use crate::config::Config;
use crate::error::{Result, ReaderError};
use crate::ocr::{ImageResolver, OcrCache, OcrOptions, OcrPipeline};
use crate::providers::CompletionClient;
use crate::settings::{ConfigProvider, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod cache;
pub mod chat;
pub mod config;
pub mod list;
pub mod ocr;
pub mod ping;
pub mod show;
pub mod special_commands;
pub mod timeline;

/// Name of the OCR cache database inside the data directory
pub const OCR_CACHE_DIR: &str = "ocr_cache";

/// Open the article repository described by `config`
///
/// # Errors
///
/// Returns error if the configured guide mapping cannot be loaded
pub fn open_repository(config: &Config) -> Result<ArticleRepository> {
    ArticleRepository::from_config(&config.articles)
}

/// Look up an article, failing when it does not exist
///
/// # Errors
///
/// Returns `ReaderError::ArticleNotFound` if no article has this id
pub fn find_article(repo: &ArticleRepository, id: &str) -> Result<ArticleData> {
    repo.lookup(id)
        .ok_or_else(|| ReaderError::ArticleNotFound(id.to_string()).into())
}

/// Open the persisted API settings in the data directory
///
/// # Errors
///
/// Returns error if the data directory cannot be determined
pub fn open_settings(config: &Config) -> Result<ConfigProvider> {
    let dir = config.data_dir()?;
    Ok(ConfigProvider::new(SettingsStore::new(dir)))
}

/// Path of the OCR cache database
///
/// # Errors
///
/// Returns error if the data directory cannot be determined
pub fn cache_path(config: &Config) -> Result<PathBuf> {
    Ok(config.data_dir()?.join(OCR_CACHE_DIR))
}

/// Open the OCR cache, running without one if it cannot be opened
///
/// Entries older than the configured TTL are dropped on open.
///
/// # Errors
///
/// Returns error if the data directory cannot be determined
pub fn open_cache(config: &Config) -> Result<OcrCache> {
    let cache = OcrCache::open_or_disabled(cache_path(config)?);
    let removed = cache.cleanup(cache_ttl(config));
    if removed > 0 {
        tracing::info!("Removed {} expired OCR cache entries", removed);
    }
    Ok(cache)
}

/// Maximum age of an OCR cache entry
pub fn cache_ttl(config: &Config) -> Duration {
    Duration::from_secs(config.ocr.cache_ttl_days.saturating_mul(24 * 60 * 60))
}

/// Build the OCR pipeline for articles served from the local archive
///
/// # Errors
///
/// Returns error if `ocr.base_url` is invalid or the pipeline cannot be
/// created
pub fn build_pipeline(
    config: &Config,
    client: Arc<dyn CompletionClient>,
    cache: OcrCache,
) -> Result<OcrPipeline> {
    let base = config
        .ocr
        .base_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .map_err(|e| ReaderError::Config(format!("ocr.base_url is not a valid URL: {}", e)))?;

    let resolver = ImageResolver::new(base)
        .with_local_archive(&config.articles.public_prefix, &config.articles.root);

    OcrPipeline::new(client, cache, resolver, OcrOptions::from(&config.ocr))
}
