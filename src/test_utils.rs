//! Test utilities for wxreader
//!
//! This module provides common test helpers: temporary archives, article
//! fixtures and assertion helpers.

use crate::config::Config;
use crate::settings::ChatConfig;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Write an article directory holding `index.html` and placeholder images
///
/// # Panics
///
/// Panics if any file cannot be written
pub fn write_article(root: &std::path::Path, id: &str, html: &str, images: &[&str]) -> PathBuf {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).expect("Failed to create article directory");
    std::fs::write(dir.join("index.html"), html).expect("Failed to write article html");
    for image in images {
        std::fs::write(dir.join(image), b"img").expect("Failed to write article image");
    }
    dir
}

/// Saved page in the shape the archive produces
pub fn sample_article_html(title: &str, epoch_secs: i64, body: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
<script>var ct = "{epoch_secs}"; var nickname = "Test Account";</script>
<div id="js_content" style="visibility: hidden;">{body}</div>
</body></html>"#
    )
}

/// Chat settings pointing at `base_url` with a dummy key
pub fn chat_config(base_url: &str) -> ChatConfig {
    ChatConfig {
        api_key: "sk-test".to_string(),
        base_url: base_url.to_string(),
        ..ChatConfig::default()
    }
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: anyhow::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration rooted in `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.articles.root = dir.path().join("articles").display().to_string();
    config.storage.data_dir = Some(dir.path().join("data").display().to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReaderError;

    #[test]
    fn test_write_article_creates_files() {
        let dir = temp_dir();
        let article = write_article(dir.path(), "a", "<p>x</p>", &["image_1.png"]);
        assert!(article.join("index.html").exists());
        assert!(article.join("image_1.png").exists());
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: anyhow::Result<()> =
            Err(ReaderError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_is_valid() {
        let dir = temp_dir();
        let config = test_config(&dir);
        assert!(config.validate().is_ok());
        assert_eq!(config.data_dir().unwrap(), dir.path().join("data"));
    }
}
