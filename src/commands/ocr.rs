//! `ocr` command: recognize the text in an article's images
//!
//! Progress goes to stderr as the pipeline publishes snapshots; the
//! per-image summary and the assembled text go to stdout.

use super::{build_pipeline, find_article, open_cache, open_repository, open_settings};
use crate::config::Config;
use crate::error::{Result, ReaderError};
use crate::ocr::{OcrResult, OcrRun, OcrStatus};
use crate::providers::create_client;
use colored::Colorize;
use prettytable::{row, Table};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Run OCR over one article, optionally retrying one image afterwards
///
/// `retry` is the 1-based position of the image to process again.
///
/// # Errors
///
/// Returns error if the article does not exist, no API key is configured
/// while images need processing, or `retry` is out of range
pub async fn run(config: &Config, id: &str, retry: Option<usize>) -> Result<()> {
    let repo = open_repository(config)?;
    let data = find_article(&repo, id)?;
    let settings = open_settings(config)?.current();
    let client = create_client(config)?;
    let pipeline = build_pipeline(config, client, open_cache(config)?)?;

    let (progress_tx, progress_rx) = watch::channel(Vec::new());
    let printer = spawn_progress_printer(progress_rx);

    let outcome = async {
        let mut run = pipeline
            .run(&data.content_html, &settings, &progress_tx)
            .await?;

        if let Some(position) = retry {
            let index = position.checked_sub(1).ok_or_else(|| {
                ReaderError::InvalidOperation("Image positions start at 1".into())
            })?;
            let status = pipeline
                .retry(&mut run, index, &settings, &progress_tx)
                .await?;
            tracing::info!("Retry of image {} finished: {}", position, status);
        }
        Ok::<OcrRun, anyhow::Error>(run)
    }
    .await;

    drop(progress_tx);
    if let Err(e) = printer.await {
        tracing::debug!("Progress printer stopped: {}", e);
    }

    let run = outcome?;
    print_summary(&run);
    Ok(())
}

pub(crate) fn spawn_progress_printer(mut rx: watch::Receiver<Vec<OcrResult>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let line = progress_line(&rx.borrow_and_update());
            if let Some(line) = line {
                eprintln!("{}", line);
            }
        }
    })
}

/// One-line progress report for a snapshot
pub(crate) fn progress_line(results: &[OcrResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let done = results
        .iter()
        .filter(|r| matches!(r.status, OcrStatus::Success | OcrStatus::Error))
        .count();
    let failed = results
        .iter()
        .filter(|r| r.status == OcrStatus::Error)
        .count();
    Some(format!(
        "[{}/{}] recognized, {} failed",
        done,
        results.len(),
        failed
    ))
}

pub(crate) fn print_summary(run: &OcrRun) {
    if run.results.is_empty() {
        println!("No images found in this article");
        return;
    }

    let mut table = Table::new();
    table.add_row(row!["#", "Status", "Detail"]);
    for (i, result) in run.results.iter().enumerate() {
        let status = match result.status {
            OcrStatus::Success => result.status.to_string().green(),
            OcrStatus::Error => result.status.to_string().red(),
            _ => result.status.to_string().normal(),
        };
        let detail = match &result.error {
            Some(error) => error.clone(),
            None => format!("{} chars", result.text.chars().count()),
        };
        table.add_row(row![i + 1, status, detail]);
    }

    let source = if run.from_cache { " (cached)" } else { "" };
    println!("\nOCR results for {}{}\n", run.hash, source);
    table.printstd();
    println!("{}", run.context_text());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line_counts_finished() {
        let mut results = vec![
            OcrResult::pending("a"),
            OcrResult::pending("b"),
            OcrResult::pending("c"),
        ];
        results[0].status = OcrStatus::Success;
        results[1].status = OcrStatus::Error;
        assert_eq!(
            progress_line(&results).as_deref(),
            Some("[2/3] recognized, 1 failed")
        );
    }

    #[test]
    fn test_progress_line_empty() {
        assert!(progress_line(&[]).is_none());
    }
}
