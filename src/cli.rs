//! Command-line interface definition for wxreader
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for browsing the article archive, running OCR over
//! article images, chatting about an article and managing local settings.

use clap::{Parser, Subcommand};

/// wxreader - offline reader for archived WeChat articles
///
/// Browse a local archive of saved articles, extract text from their
/// images and ask questions about them through an OpenAI-compatible API.
#[derive(Parser, Debug, Clone)]
#[command(name = "wxreader")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "WXREADER_CONFIG", default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the article archive directory
    #[arg(long)]
    pub articles_dir: Option<String>,

    /// Override the directory holding settings and the OCR cache
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for wxreader
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List archived articles, newest first
    List {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one article
    Show {
        /// Article id (directory name)
        id: String,

        /// Print the rewritten body HTML instead of plain text
        #[arg(long)]
        html: bool,
    },

    /// Show the monthly timeline of a year
    Timeline {
        /// Year to show (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,
    },

    /// Recognize the text in an article's images
    Ocr {
        /// Article id (directory name)
        id: String,

        /// Retry a single image by its 1-based position after the run
        #[arg(long)]
        retry: Option<usize>,
    },

    /// Start an interactive chat about an article
    Chat {
        /// Article id (directory name)
        id: String,

        /// Skip image text recognition before chatting
        #[arg(long)]
        no_ocr: bool,
    },

    /// Show or change the API settings
    Config {
        /// Settings subcommand
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Test the connection to the chat API
    Ping,

    /// Manage the OCR result cache
    Cache {
        /// Cache subcommand
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// API settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Show the current settings with the API key masked
    Show,

    /// Update one or more settings
    Set {
        /// API key
        #[arg(long)]
        api_key: Option<String>,

        /// API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Model used for image text recognition
        #[arg(long)]
        ocr_model: Option<String>,

        /// Model used for chat
        #[arg(long)]
        chat_model: Option<String>,
    },
}

/// OCR cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Remove entries older than the configured TTL
    Cleanup,

    /// Remove every entry
    Clear,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            articles_dir: None,
            data_dir: None,
            command: Commands::List { json: false },
        }
    }
}
