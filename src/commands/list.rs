//! `list` command: the archive as a table or JSON

use super::open_repository;
use crate::articles::Article;
use crate::config::Config;
use crate::error::{Result, ReaderError};
use colored::Colorize;
use prettytable::{row, Table};

/// Print every article, newest first
///
/// # Errors
///
/// Returns error if the repository cannot be opened or JSON output fails
pub fn run(config: &Config, json: bool) -> Result<()> {
    let repo = open_repository(config)?;
    let articles = repo.list();
    tracing::debug!("Found {} articles", articles.len());

    if json {
        let out = serde_json::to_string_pretty(&articles).map_err(ReaderError::Serialization)?;
        println!("{}", out);
        return Ok(());
    }

    if articles.is_empty() {
        println!("No articles found in {}", repo.root().display());
        return Ok(());
    }

    print_table(&articles);
    Ok(())
}

fn print_table(articles: &[Article]) {
    let mut table = Table::new();
    table.add_row(row!["Date", "Title", "Account", "Id"]);

    for article in articles {
        let title = if article.is_original == Some(true) {
            format!("{} {}", article.title, "[原创]".yellow())
        } else {
            article.title.clone()
        };
        table.add_row(row![
            date_only(&article.date),
            title,
            article.account_name.as_deref().unwrap_or("-"),
            article.id
        ]);
    }

    println!();
    table.printstd();
    println!();
}

/// Calendar date part of a stored ISO timestamp
pub(crate) fn date_only(date: &str) -> &str {
    date.get(..10).unwrap_or(date)
}
