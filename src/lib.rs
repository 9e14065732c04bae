//! wxreader - offline reader for archived WeChat articles
//!
//! This library provides the core functionality for reading a local archive
//! of saved articles, recognizing the text inside their images and chatting
//! about an article through an OpenAI-compatible completion API.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `articles`: Archive scanning, metadata extraction, table of contents and timeline
//! - `ocr`: Batch image text recognition with progress and a persistent cache
//! - `chat`: Streaming chat sessions grounded in an article
//! - `providers`: Completion client abstraction and the OpenAI-compatible client
//! - `settings`: Persisted API settings shared between components
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use wxreader::{ArticleRepository, Config};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let repo = ArticleRepository::from_config(&config.articles)?;
//!     for article in repo.list() {
//!         println!("{} {}", article.date, article.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod articles;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod ocr;
pub mod providers;
pub mod settings;

// Re-export commonly used types
pub use articles::{Article, ArticleData, ArticleRepository};
pub use chat::{ArticleContext, ChatSession, SendOutcome};
pub use config::Config;
pub use error::{ReaderError, Result};
pub use ocr::{OcrPipeline, OcrResult, OcrRun, OcrStatus};
pub use settings::{ChatConfig, ChatConfigUpdate, ConfigProvider};

#[cfg(test)]
pub mod test_utils;
