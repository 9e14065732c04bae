//! Special commands parser for interactive chat
//!
//! Lines starting with `/` manage the conversation instead of being sent
//! to the model. Message numbers are 1-based, matching `/history`.
//! Command names are case-insensitive; the text given to `/edit` is kept
//! as typed.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an argument it cannot use
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// List the conversation with message numbers
    History,

    /// Replace user message `number` and regenerate from there
    Edit { number: usize, text: String },

    /// Regenerate assistant message `number`, or the last reply when `None`
    Retry(Option<usize>),

    /// Remove message `number`
    Delete(usize),

    /// Show the OCR status of the article images
    Images,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input to the model
    None,
}

/// Parse a user input line into a special command
///
/// # Errors
///
/// Returns `CommandError` when the input starts with `/` but is not a
/// valid command or has a malformed argument
///
/// # Examples
///
/// ```
/// use wxreader::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/retry").unwrap(), SpecialCommand::Retry(None));
/// assert_eq!(
///     parse_special_command("/edit 3 What about March?").unwrap(),
///     SpecialCommand::Edit { number: 3, text: "What about March?".into() }
/// );
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return Ok(match lower.as_str() {
            "exit" | "quit" => SpecialCommand::Exit,
            _ => SpecialCommand::None,
        });
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match name.as_str() {
        "/history" | "/h" => Ok(SpecialCommand::History),
        "/images" => Ok(SpecialCommand::Images),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        "/retry" => {
            if rest.is_empty() {
                Ok(SpecialCommand::Retry(None))
            } else {
                parse_number("/retry", rest).map(|n| SpecialCommand::Retry(Some(n)))
            }
        }
        "/delete" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "/delete".to_string(),
                    usage: "/delete <number>".to_string(),
                });
            }
            parse_number("/delete", rest).map(SpecialCommand::Delete)
        }
        "/edit" => {
            let (number, text) = match rest.split_once(char::is_whitespace) {
                Some((number, text)) if !text.trim().is_empty() => (number, text.trim()),
                _ => {
                    return Err(CommandError::MissingArgument {
                        command: "/edit".to_string(),
                        usage: "/edit <number> <new text>".to_string(),
                    })
                }
            };
            parse_number("/edit", number).map(|number| SpecialCommand::Edit {
                number,
                text: text.to_string(),
            })
        }
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn parse_number(command: &str, arg: &str) -> Result<usize, CommandError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        }),
    }
}

/// Print the special command reference
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CONVERSATION:
  /history            - List messages with their numbers
  /edit <n> <text>    - Replace user message n and regenerate the reply
  /retry [n]          - Regenerate assistant message n (default: last reply)
  /delete <n>         - Remove message n

ARTICLE:
  /images             - Show image text recognition status

SESSION:
  /help               - Show this help message
  /exit, exit, quit   - Leave the chat

While a reply is streaming, press Ctrl+C to stop it. The partial reply is kept.
"#
    );
}
