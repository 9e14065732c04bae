//! Image discovery and inline data conversion

use crate::error::{Result, ReaderError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use url::Url;

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("valid img pattern")
});

/// Turns `src` attribute values into fetchable URLs
///
/// Absolute `http(s)` and `data:` sources pass through. Sources under the
/// public article prefix map to files in the local archive when one is
/// configured. Everything else is joined onto the directory of the page
/// base URL.
#[derive(Debug, Clone, Default)]
pub struct ImageResolver {
    base: Option<Url>,
    local: Option<(String, PathBuf)>,
}

impl ImageResolver {
    /// Resolver for pages served from `base`
    pub fn new(base: Option<Url>) -> Self {
        Self { base, local: None }
    }

    /// Serve sources starting with `prefix` from the directory `root`
    pub fn with_local_archive(mut self, prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        self.local = Some((prefix, root.into()));
        self
    }

    /// Resolve a single `src` value
    ///
    /// Returns `None` when the source cannot be turned into a URL.
    pub fn resolve(&self, src: &str) -> Option<String> {
        if src.starts_with("http") || src.starts_with("data:") {
            return Some(src.to_string());
        }

        if let Some((prefix, root)) = &self.local {
            if let Some(rest) = src.strip_prefix(prefix.as_str()).and_then(|r| r.strip_prefix('/')) {
                let mut path = root.clone();
                for segment in rest.split('/') {
                    let decoded = urlencoding::decode(segment)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| segment.to_string());
                    path.push(decoded);
                }
                let absolute = if path.is_absolute() {
                    path
                } else {
                    std::env::current_dir()
                        .map(|cwd| cwd.join(&path))
                        .unwrap_or(path)
                };
                return match Url::from_file_path(&absolute) {
                    Ok(url) => Some(url.to_string()),
                    Err(()) => {
                        tracing::warn!("Failed to resolve image path: {}", absolute.display());
                        None
                    }
                };
            }
        }

        let base = match &self.base {
            Some(base) => base,
            None => {
                tracing::warn!("Failed to resolve image URL without a page base: {}", src);
                return None;
            }
        };

        match base.join(src) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::warn!("Failed to resolve image URL {}: {}", src, e);
                None
            }
        }
    }
}

/// Extract image URLs from `html` in document order
///
/// At most `max` URLs are returned. Sources that fail to resolve are
/// skipped.
pub fn extract_image_urls(html: &str, resolver: &ImageResolver, max: usize) -> Vec<String> {
    IMG_SRC
        .captures_iter(html)
        .filter_map(|cap| resolver.resolve(&cap[1]))
        .take(max)
        .collect()
}

/// Convert an image URL to a `data:` URL
///
/// `data:` URLs are returned as-is. `file://` URLs are read from disk and
/// anything else is fetched over HTTP. The MIME type comes from the
/// response `Content-Type` when it names an image, otherwise it is sniffed
/// from the bytes.
///
/// # Errors
///
/// Returns error if the image cannot be read or fetched
pub async fn to_data_url(http: &reqwest::Client, url: &str) -> Result<String> {
    if url.starts_with("data:") {
        return Ok(url.to_string());
    }

    let (bytes, declared) = if url.starts_with("file:") {
        let path = Url::parse(url)?
            .to_file_path()
            .map_err(|_| ReaderError::InvalidOperation(format!("Not a local file: {}", url)))?;
        (tokio::fs::read(&path).await?, None)
    } else {
        let response = http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Api {
                status: status.as_u16(),
                message: format!("Failed to fetch image: {}", status),
            }
            .into());
        }
        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"));
        (response.bytes().await?.to_vec(), declared)
    };

    let mime = declared.unwrap_or_else(|| sniff_mime(&bytes).to_string());
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&bytes)))
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}
