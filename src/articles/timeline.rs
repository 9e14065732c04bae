//! Monthly timeline of articles for one year

use super::Article;
use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::Serialize;

/// Display state of a month slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthState {
    /// An article exists for the month
    Completed,
    /// The current month, no article yet
    Current,
    /// A future month
    Upcoming,
    /// A past month that never got an article
    Locked,
}

impl std::fmt::Display for MonthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Current => write!(f, "current"),
            Self::Upcoming => write!(f, "upcoming"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

/// One month of the timeline
#[derive(Debug, Clone, Serialize)]
pub struct MonthSlot {
    /// Month number, 1 to 12
    pub month: u32,
    /// First article (in the given order) dated in this month
    pub article: Option<Article>,
    /// Display state
    pub state: MonthState,
}

/// Build the twelve month slots of `year` as of `today`
///
/// Article dates are bucketed by local calendar month.
pub fn build_timeline(articles: &[Article], year: i32, today: NaiveDate) -> Vec<MonthSlot> {
    (1..=12)
        .map(|month| {
            let article = articles
                .iter()
                .find(|a| local_year_month(&a.date) == Some((year, month)))
                .cloned();

            let state = if article.is_some() {
                MonthState::Completed
            } else if year < today.year() || (year == today.year() && month < today.month()) {
                MonthState::Locked
            } else if year == today.year() && month == today.month() {
                MonthState::Current
            } else {
                MonthState::Upcoming
            };

            MonthSlot {
                month,
                article,
                state,
            }
        })
        .collect()
}

fn local_year_month(date: &str) -> Option<(i32, u32)> {
    let local = DateTime::parse_from_rfc3339(date).ok()?.with_timezone(&Local);
    Some((local.year(), local.month()))
}
