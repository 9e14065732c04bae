//! `chat` command: interactive conversation about one article
//!
//! The article images are recognized first so the assistant can answer
//! questions about their text. Replies stream to the terminal as they
//! arrive; Ctrl+C stops the current reply without leaving the session.

use super::ocr::{print_summary, spawn_progress_printer};
use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use super::{build_pipeline, find_article, open_cache, open_repository, open_settings};
use crate::chat::{ArticleContext, ChatSession, SendOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::ocr::{OcrPipeline, OcrRun};
use crate::providers::create_client;
use crate::settings::ChatConfig;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Conversation change requested at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Send(String),
    Edit { index: usize, text: String },
    Retry(usize),
}

/// Start interactive chat about the article `id`
///
/// # Errors
///
/// Returns error if the article does not exist or the terminal cannot be
/// read
pub async fn run(config: Config, id: &str, no_ocr: bool) -> Result<()> {
    let repo = open_repository(&config)?;
    let data = find_article(&repo, id)?;
    let provider = open_settings(&config)?;
    let client = create_client(&config)?;

    let mut context = ArticleContext::new(data.content_html.clone());
    let mut ocr_run = None;
    if !no_ocr {
        let pipeline = build_pipeline(&config, client.clone(), open_cache(&config)?)?;
        match recognize_images(&pipeline, &data.content_html, &provider.current()).await {
            Ok(run) => {
                context = context.with_ocr_run(&run);
                ocr_run = Some(run);
            }
            Err(e) => {
                tracing::warn!("Continuing without image text: {}", e);
                println!("{} {}", "Image text unavailable:".yellow(), e);
            }
        }
    }

    let mut session = ChatSession::new(client, provider.subscribe(), config.chat.clone(), context);
    session.greet();

    print_welcome_banner(&data.article.title, &provider.current());
    if let Some(greeting) = session.messages().first() {
        println!("{} {}\n", "assistant>".cyan().bold(), greeting.text());
    }

    let mut rl = DefaultEditor::new()?;

    loop {
        let line = match rl.readline(&format!("{} ", "you>".green().bold())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        rl.add_history_entry(trimmed)?;

        let command = match parse_special_command(trimmed) {
            Ok(command) => command,
            Err(e) => {
                println!("{}\n", e.to_string().red());
                continue;
            }
        };

        let action = match command {
            SpecialCommand::None => Action::Send(trimmed.to_string()),
            SpecialCommand::Edit { number, text } => Action::Edit {
                index: number - 1,
                text,
            },
            SpecialCommand::Retry(number) => {
                match number.map(|n| n - 1).or_else(|| last_reply_index(&session)) {
                    Some(index) => Action::Retry(index),
                    None => {
                        println!("{}\n", "No reply to regenerate".red());
                        continue;
                    }
                }
            }
            SpecialCommand::Delete(number) => {
                match session.delete(number - 1) {
                    Ok(removed) => println!("Deleted {} message {}\n", removed.role, number),
                    Err(e) => println!("{}\n", e.to_string().red()),
                }
                continue;
            }
            SpecialCommand::History => {
                print_history(&session);
                continue;
            }
            SpecialCommand::Images => {
                match &ocr_run {
                    Some(run) => print_summary(run),
                    None => println!("Image text recognition was not run\n"),
                }
                continue;
            }
            SpecialCommand::Help => {
                print_help();
                continue;
            }
            SpecialCommand::Exit => break,
        };

        if let Err(e) = stream_reply(&mut session, action).await {
            println!("{}\n", e.to_string().red());
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn recognize_images(
    pipeline: &OcrPipeline,
    html: &str,
    settings: &ChatConfig,
) -> Result<OcrRun> {
    if !pipeline.image_urls(html).is_empty() {
        println!("Recognizing article images...");
    }
    let (progress_tx, progress_rx) = watch::channel(Vec::new());
    let printer = spawn_progress_printer(progress_rx);
    let result = pipeline.run(html, settings, &progress_tx).await;
    drop(progress_tx);
    if let Err(e) = printer.await {
        tracing::debug!("Progress printer stopped: {}", e);
    }
    result
}

/// Run one conversation action, printing deltas as they arrive
async fn stream_reply(session: &mut ChatSession, action: Action) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    print!("{} ", "assistant>".cyan().bold());
    let _ = std::io::stdout().flush();
    let on_delta = |delta: &str| {
        print!("{}", delta);
        let _ = std::io::stdout().flush();
    };

    let outcome = match action {
        Action::Send(text) => session.send(&text, &cancel, on_delta).await,
        Action::Edit { index, text } => session.edit(index, &text, &cancel, on_delta).await,
        Action::Retry(index) => session.retry(index, &cancel, on_delta).await,
    };
    interrupt.abort();

    match outcome {
        Ok(SendOutcome::Completed) => println!("\n"),
        Ok(SendOutcome::Cancelled) => println!("\n{}\n", "(generation stopped)".dimmed()),
        Ok(SendOutcome::Failed(message)) => println!("\n{}\n", format!("Error: {}", message).red()),
        Err(e) => {
            println!();
            return Err(e);
        }
    }
    Ok(())
}

fn last_reply_index(session: &ChatSession) -> Option<usize> {
    session.messages().iter().rposition(|m| m.is_assistant())
}

fn print_history(session: &ChatSession) {
    println!();
    for (i, message) in session.messages().iter().enumerate() {
        let label = if message.is_user() {
            "you".green().bold()
        } else {
            message.role.cyan().bold()
        };
        println!("{:>3}. {}: {}", i + 1, label, message.text());
    }
    println!();
}

fn print_welcome_banner(title: &str, settings: &ChatConfig) {
    println!("\n{}", "wxreader chat".bold());
    println!("Article: {}", title);
    println!("Model:   {}", settings.chat_model);
    if !settings.has_api_key() {
        println!(
            "{}",
            "No API key configured. Run `wxreader config set --api-key <KEY>` first.".yellow()
        );
    }
    println!("Type '/help' for commands, 'exit' to leave.\n");
}
