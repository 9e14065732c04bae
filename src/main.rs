//! wxreader - offline reader for archived WeChat articles
//!
#![doc = "Main entry point for the wxreader application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wxreader::cli::{Cli, Commands};
use wxreader::commands;
use wxreader::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::List { json } => {
            tracing::debug!("Listing articles under {}", config.articles.root);
            commands::list::run(&config, json)
        }
        Commands::Show { id, html } => commands::show::run(&config, &id, html),
        Commands::Timeline { year } => commands::timeline::run(&config, year),
        Commands::Ocr { id, retry } => {
            tracing::info!("Starting OCR for article {}", id);
            commands::ocr::run(&config, &id, retry).await
        }
        Commands::Chat { id, no_ocr } => {
            tracing::info!("Starting chat about article {}", id);
            commands::chat::run(config, &id, no_ocr).await
        }
        Commands::Config { command } => commands::config::run(&config, command),
        Commands::Ping => commands::ping::run(&config).await,
        Commands::Cache { command } => commands::cache::run(&config, command),
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "wxreader=debug"
    } else {
        "wxreader=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
