//! `show` command: metadata, table of contents and body of one article

use super::{find_article, open_repository};
use crate::articles::ArticleData;
use crate::chat::strip_tags;
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Print one article
///
/// # Errors
///
/// Returns `ReaderError::ArticleNotFound` if no article has this id
pub fn run(config: &Config, id: &str, html: bool) -> Result<()> {
    let repo = open_repository(config)?;
    let data = find_article(&repo, id)?;

    print_header(&data);
    if html {
        println!("{}", data.content_html);
    } else {
        println!("{}", plain_text(&data.content_html));
    }
    Ok(())
}

fn print_header(data: &ArticleData) {
    let article = &data.article;
    println!("\n{}\n", article.title.bold());
    println!("Date:     {}", article.date);
    if let Some(account) = &article.account_name {
        println!("Account:  {}", account);
    }
    if let Some(author) = &article.author {
        println!("Author:   {}", author);
    }
    if let Some(location) = &article.location {
        println!("Location: {}", location);
    }
    if article.is_original == Some(true) {
        println!("Original: {}", "yes".green());
    }

    if let Some(toc) = article.toc.as_ref().filter(|t| !t.is_empty()) {
        println!("\n{}", "Contents".bold());
        for entry in toc {
            let indent = "  ".repeat(usize::from(entry.level.saturating_sub(2)));
            println!("{}- {} {}", indent, entry.text, format!("#{}", entry.id).dimmed());
        }
    }
    println!();
}

/// Body HTML reduced to readable text
pub(crate) fn plain_text(html: &str) -> String {
    BLANK_RUNS
        .replace_all(&strip_tags(html), " ")
        .trim()
        .to_string()
}
