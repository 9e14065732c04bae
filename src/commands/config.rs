//! `config` command: show or change the persisted API settings

use super::open_settings;
use crate::cli::ConfigCommand;
use crate::config::Config;
use crate::error::{Result, ReaderError};
use crate::settings::{ChatConfig, ChatConfigUpdate};
use colored::Colorize;

/// Handle a `config` subcommand
///
/// # Errors
///
/// Returns error if `set` is given no fields or the settings entry cannot
/// be written
pub fn run(config: &Config, command: ConfigCommand) -> Result<()> {
    let provider = open_settings(config)?;

    match command {
        ConfigCommand::Show => {
            print_settings(&provider.current());
            Ok(())
        }
        ConfigCommand::Set {
            api_key,
            base_url,
            ocr_model,
            chat_model,
        } => {
            let update = ChatConfigUpdate {
                api_key,
                base_url,
                ocr_model,
                chat_model,
            };
            if update == ChatConfigUpdate::default() {
                return Err(ReaderError::InvalidOperation(
                    "Nothing to set; pass at least one of --api-key, --base-url, --ocr-model, --chat-model"
                        .into(),
                )
                .into());
            }

            let updated = provider.subscribe().update(update)?;
            tracing::info!("Chat settings updated");
            println!("{}", "Settings saved".green());
            print_settings(&updated);
            Ok(())
        }
    }
}

fn print_settings(settings: &ChatConfig) {
    println!("API Key:     {}", settings.masked_api_key());
    println!("Base URL:    {}", settings.base_url);
    println!("OCR Model:   {}", settings.ocr_model);
    println!("Chat Model:  {}", settings.chat_model);
}
