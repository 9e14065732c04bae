//! OCR batch pipeline
//!
//! Given article HTML, the pipeline finds the embedded images, asks the
//! vision model for the text of each one, and caches the full result list
//! under a hash of the HTML. Images are split into contiguous chunks that
//! run concurrently; images within a chunk run one after another. Every
//! status change is published as a whole-list snapshot on a
//! [`tokio::sync::watch`] channel.

pub mod cache;
pub mod format;
pub mod images;

pub use cache::{CachedOcr, OcrCache};
pub use format::{assemble, sanitize};
pub use images::{extract_image_urls, to_data_url, ImageResolver};

use crate::config::OcrConfig;
use crate::error::{Result, ReaderError};
use crate::providers::{CompletionClient, CompletionRequest, ContentPart, ImageUrl, Message};
use crate::settings::ChatConfig;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Instruction sent alongside every image
pub const OCR_PROMPT: &str = "请识别图片中的所有文字内容，按原始布局输出。";

/// Processing state of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrStatus {
    /// Not started
    Pending,
    /// Request in flight
    Processing,
    /// Text extracted
    Success,
    /// Request failed
    Error,
}

impl std::fmt::Display for OcrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result for one image, keyed by position in the image list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Image URL as found in the article
    pub url: String,
    /// Current state
    pub status: OcrStatus,
    /// Extracted text, empty unless successful
    #[serde(default)]
    pub text: String,
    /// Failure message when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrResult {
    /// A not-yet-started entry for `url`
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: OcrStatus::Pending,
            text: String::new(),
            error: None,
        }
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct OcrRun {
    /// Content hash the results are cached under
    pub hash: String,
    /// Per-image results in image order
    pub results: Vec<OcrResult>,
    /// Whether the results were served from the cache
    pub from_cache: bool,
}

impl OcrRun {
    /// Sanitized context text for the chat session
    pub fn context_text(&self) -> String {
        sanitize(&assemble(&self.results))
    }

    /// Count of entries with the given status
    pub fn count(&self, status: OcrStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Hash identifying article content in the cache
///
/// The first 16 hex characters of the SHA-256 digest, or `empty` for empty
/// content.
///
/// # Examples
///
/// ```
/// use wxreader::ocr::content_hash;
///
/// assert_eq!(content_hash(""), "empty");
/// assert_eq!(content_hash("abc"), "ba7816bf8f01cfea");
/// ```
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return "empty".to_string();
    }
    let digest = Sha256::digest(content.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Tuning parameters for a pipeline
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Number of concurrent chunks
    pub concurrency: usize,
    /// Maximum images per article
    pub max_images: usize,
    /// Output token cap per request
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self::from(&OcrConfig::default())
    }
}

impl From<&OcrConfig> for OcrOptions {
    fn from(config: &OcrConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_images: config.max_images,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Shared result list that publishes a snapshot after every change
struct Progress {
    results: Mutex<Vec<OcrResult>>,
    tx: watch::Sender<Vec<OcrResult>>,
}

impl Progress {
    fn new(results: Vec<OcrResult>, tx: watch::Sender<Vec<OcrResult>>) -> Self {
        tx.send_replace(results.clone());
        Self {
            results: Mutex::new(results),
            tx,
        }
    }

    fn set(&self, index: usize, result: OcrResult) {
        if let Ok(mut guard) = self.results.lock() {
            if let Some(slot) = guard.get_mut(index) {
                *slot = result;
            }
            self.tx.send_replace(guard.clone());
        }
    }

    fn snapshot(&self) -> Vec<OcrResult> {
        self.results
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// OCR batch pipeline
pub struct OcrPipeline {
    client: Arc<dyn CompletionClient>,
    cache: OcrCache,
    http: reqwest::Client,
    resolver: ImageResolver,
    options: OcrOptions,
}

impl OcrPipeline {
    /// Create a pipeline
    ///
    /// # Errors
    ///
    /// Returns error if the image download client cannot be built
    pub fn new(
        client: Arc<dyn CompletionClient>,
        cache: OcrCache,
        resolver: ImageResolver,
        options: OcrOptions,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("wxreader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReaderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cache,
            http,
            resolver,
            options,
        })
    }

    /// Image URLs the pipeline would process for `html`
    pub fn image_urls(&self, html: &str) -> Vec<String> {
        extract_image_urls(html, &self.resolver, self.options.max_images)
    }

    /// Run OCR over every image in `html`
    ///
    /// A cache entry whose result count equals the current image count is
    /// returned without any requests. Otherwise every image is processed and
    /// the full result list is written to the cache, failures included.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::MissingApiKey` if images need processing and no
    /// key is configured. Individual image failures are recorded in the
    /// results instead.
    pub async fn run(
        &self,
        html: &str,
        config: &ChatConfig,
        progress_tx: &watch::Sender<Vec<OcrResult>>,
    ) -> Result<OcrRun> {
        let hash = content_hash(html);
        let urls = self.image_urls(html);

        if let Some(cached) = self.cache.get(&hash) {
            if cached.len() == urls.len() {
                tracing::info!("Using cached OCR results for {} ({} images)", hash, urls.len());
                progress_tx.send_replace(cached.clone());
                return Ok(OcrRun {
                    hash,
                    results: cached,
                    from_cache: true,
                });
            }
            tracing::debug!(
                "Ignoring cached OCR results for {}: {} cached, {} images",
                hash,
                cached.len(),
                urls.len()
            );
        }

        if urls.is_empty() {
            progress_tx.send_replace(Vec::new());
            return Ok(OcrRun {
                hash,
                results: Vec::new(),
                from_cache: false,
            });
        }

        if !config.has_api_key() {
            return Err(ReaderError::MissingApiKey.into());
        }

        tracing::info!("Starting OCR for {} images ({})", urls.len(), hash);

        let progress = Progress::new(
            urls.iter().map(OcrResult::pending).collect(),
            progress_tx.clone(),
        );

        let chunk_size = urls.len().div_ceil(self.options.concurrency.max(1));
        let indices: Vec<usize> = (0..urls.len()).collect();
        let workers = indices.chunks(chunk_size).map(|chunk| {
            let progress = &progress;
            let urls = &urls;
            async move {
                for &index in chunk {
                    self.process_image(index, &urls[index], config, progress).await;
                }
            }
        });
        join_all(workers).await;

        let results = progress.snapshot();
        self.cache.set(&hash, &results);

        let run = OcrRun {
            hash,
            results,
            from_cache: false,
        };
        tracing::info!(
            "OCR finished: {} succeeded, {} failed",
            run.count(OcrStatus::Success),
            run.count(OcrStatus::Error)
        );
        Ok(run)
    }

    /// Reprocess the image at `index` of a previous run
    ///
    /// On success the whole updated list is written back to the cache; on
    /// failure the error is recorded and the cache is left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range or no API key is configured
    pub async fn retry(
        &self,
        run: &mut OcrRun,
        index: usize,
        config: &ChatConfig,
        progress_tx: &watch::Sender<Vec<OcrResult>>,
    ) -> Result<OcrStatus> {
        let url = run
            .results
            .get(index)
            .map(|r| r.url.clone())
            .ok_or_else(|| {
                ReaderError::InvalidOperation(format!(
                    "Image {} does not exist ({} images)",
                    index + 1,
                    run.results.len()
                ))
            })?;

        if !config.has_api_key() {
            return Err(ReaderError::MissingApiKey.into());
        }

        let progress = Progress::new(run.results.clone(), progress_tx.clone());
        let status = self.process_image(index, &url, config, &progress).await;
        run.results = progress.snapshot();
        run.from_cache = false;

        if status == OcrStatus::Success {
            self.cache.set(&run.hash, &run.results);
        }
        Ok(status)
    }

    async fn process_image(
        &self,
        index: usize,
        url: &str,
        config: &ChatConfig,
        progress: &Progress,
    ) -> OcrStatus {
        progress.set(
            index,
            OcrResult {
                url: url.to_string(),
                status: OcrStatus::Processing,
                text: String::new(),
                error: None,
            },
        );

        let result = match self.recognize(url, config).await {
            Ok(text) => {
                tracing::debug!("Image {} recognized ({} chars)", index + 1, text.len());
                OcrResult {
                    url: url.to_string(),
                    status: OcrStatus::Success,
                    text,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Image {} failed: {}", index + 1, e);
                OcrResult {
                    url: url.to_string(),
                    status: OcrStatus::Error,
                    text: String::new(),
                    error: Some(format!("{} (Image: {})", e, preview(url))),
                }
            }
        };

        let status = result.status;
        progress.set(index, result);
        status
    }

    async fn recognize(&self, url: &str, config: &ChatConfig) -> Result<String> {
        let image = match to_data_url(&self.http, url).await {
            Ok(data_url) => data_url,
            Err(e) => {
                tracing::debug!("Inline conversion failed for {}, sending URL: {}", url, e);
                url.to_string()
            }
        };

        let message = Message::user_parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: image },
            },
            ContentPart::Text {
                text: OCR_PROMPT.to_string(),
            },
        ]);
        let request = CompletionRequest::new(&config.ocr_model, vec![message], self.options.max_tokens)
            .with_temperature(self.options.temperature);

        self.client.complete(config, request).await
    }
}

/// First 100 characters of `url`, with an ellipsis when longer
fn preview(url: &str) -> String {
    let mut chars = url.chars();
    let head: String = chars.by_ref().take(100).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
