//! `timeline` command: one row per month of a year

use super::open_repository;
use crate::articles::{build_timeline, MonthSlot, MonthState};
use crate::config::Config;
use crate::error::Result;
use chrono::{Datelike, Local};
use colored::{ColoredString, Colorize};
use prettytable::{row, Table};

/// Print the twelve months of `year`, defaulting to the current year
///
/// # Errors
///
/// Returns error if the repository cannot be opened
pub fn run(config: &Config, year: Option<i32>) -> Result<()> {
    let repo = open_repository(config)?;
    let today = Local::now().date_naive();
    let year = year.unwrap_or_else(|| today.year());

    let slots = build_timeline(&repo.list(), year, today);
    let completed = slots
        .iter()
        .filter(|s| s.state == MonthState::Completed)
        .count();

    let mut table = Table::new();
    table.add_row(row!["Month", "State", "Article"]);
    for slot in &slots {
        table.add_row(row![
            format!("{}-{:02}", year, slot.month),
            state_label(slot.state),
            article_label(slot)
        ]);
    }

    println!("\nTimeline {} ({}/12 months)\n", year, completed);
    table.printstd();
    println!();
    Ok(())
}

fn state_label(state: MonthState) -> ColoredString {
    let label = state.to_string();
    match state {
        MonthState::Completed => label.green(),
        MonthState::Current => label.yellow().bold(),
        MonthState::Upcoming => label.normal(),
        MonthState::Locked => label.dimmed(),
    }
}

fn article_label(slot: &MonthSlot) -> String {
    slot.article
        .as_ref()
        .map(|a| format!("{} ({})", a.title, a.id))
        .unwrap_or_default()
}
