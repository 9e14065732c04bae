//! `ping` command: connection test against the configured endpoint

use super::open_settings;
use crate::config::Config;
use crate::error::Result;
use crate::providers::{create_client, ping};
use colored::Colorize;

/// Send a one-token request with the stored settings
///
/// # Errors
///
/// Returns error if no API key is configured or the endpoint rejects the
/// request
pub async fn run(config: &Config) -> Result<()> {
    let settings = open_settings(config)?.current();
    let client = create_client(config)?;

    println!("Testing {} with model {}...", settings.base_url, settings.chat_model);
    match ping(client.as_ref(), &settings).await {
        Ok(()) => {
            println!("{}", "Connection OK".green());
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Connection failed:".red(), e);
            Err(e)
        }
    }
}
