//! Metadata extraction from saved article HTML
//!
//! Each metadata field is described by an ordered list of patterns; the
//! first pattern that matches and converts wins. Callers supply the
//! fallback for fields that must always have a value.

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A metadata field that can be extracted from article HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Article title
    Title,
    /// Publication time as an ISO-8601 UTC string
    Date,
    /// Name of the publishing account
    AccountName,
    /// Author name
    Author,
    /// Publication location
    Location,
}

type Convert = fn(&Captures) -> Option<String>;

struct Rule {
    pattern: Regex,
    convert: Convert,
}

struct Extractor {
    field: Field,
    rules: Vec<Rule>,
}

fn rule(pattern: &str, convert: Convert) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid extractor pattern"),
        convert,
    }
}

fn trimmed(caps: &Captures) -> Option<String> {
    Some(caps[1].trim().to_string())
}

fn verbatim(caps: &Captures) -> Option<String> {
    Some(caps[1].to_string())
}

fn from_epoch_seconds(caps: &Captures) -> Option<String> {
    let secs: i64 = caps[1].parse().ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| iso_utc(&dt))
}

fn from_local_publish_time(caps: &Captures) -> Option<String> {
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(iso_utc(&local.with_timezone(&Utc)))
}

static EXTRACTORS: Lazy<Vec<Extractor>> = Lazy::new(|| {
    vec![
        Extractor {
            field: Field::Title,
            rules: vec![
                rule(r"(?is)<title>(.*?)</title>", trimmed),
                rule(r#"(?is)<h1[^>]*class="article-title"[^>]*>(.*?)</h1>"#, trimmed),
            ],
        },
        Extractor {
            field: Field::Date,
            rules: vec![
                rule(r#"var\s+ct\s*=\s*"(\d+)""#, from_epoch_seconds),
                rule(
                    r#"(?i)<em[^>]*id="publish_time"[^>]*>(\d{4})年(\d{1,2})月(\d{1,2})日\s*(\d{1,2}):(\d{2})</em>"#,
                    from_local_publish_time,
                ),
            ],
        },
        Extractor {
            field: Field::AccountName,
            rules: vec![
                rule(r#"var\s+nickname\s*=\s*"([^"]+)""#, verbatim),
                rule(r#"data-nickname="([^"]+)""#, verbatim),
            ],
        },
        Extractor {
            field: Field::Author,
            rules: vec![
                rule(r#"var\s+user_name\s*=\s*"([^"]+)""#, trimmed),
                rule(
                    r#"(?is)<span[^>]*class="rich_media_meta\s+rich_media_meta_text"[^>]*>(.*?)</span>"#,
                    trimmed,
                ),
            ],
        },
        Extractor {
            field: Field::Location,
            rules: vec![rule(r#"ip_wording2\s*:\s*"([^"]+)""#, verbatim)],
        },
    ]
});

static DIV_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(/?)div\b[^>]*>").expect("valid div pattern"));
static BODY_OPEN: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r#"(?i)<div[^>]*id="js_content"[^>]*>"#).expect("valid body pattern"),
        Regex::new(r#"(?i)<div[^>]*class="rich_media_content[^"]*"[^>]*>"#)
            .expect("valid body pattern"),
    ]
});

/// Format a UTC time the way article dates are stored
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use wxreader::articles::extract::iso_utc;
///
/// let dt = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
/// assert_eq!(iso_utc(&dt), "2023-11-14T22:13:20.000Z");
/// ```
pub fn iso_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Extract `field` from `html`
pub fn extract(html: &str, field: Field) -> Option<String> {
    let extractor = EXTRACTORS.iter().find(|e| e.field == field)?;
    extractor.rules.iter().find_map(|rule| {
        rule.pattern
            .captures(html)
            .and_then(|caps| (rule.convert)(&caps))
    })
}

/// Whether the article is marked as original content
pub fn is_original(html: &str) -> bool {
    html.contains("copyright_logo") || html.contains("原创")
}

/// Inner HTML of the article body container
///
/// Looks for the `js_content` container, then a `rich_media_content`
/// container, and falls back to the whole document. Nested `div`s inside
/// the container are balanced.
pub fn extract_body(html: &str) -> &str {
    for open in BODY_OPEN.iter() {
        if let Some(m) = open.find(html) {
            return balanced_div_inner(html, m.end());
        }
    }
    html
}

fn balanced_div_inner(html: &str, start: usize) -> &str {
    let mut depth = 1usize;
    for caps in DIV_TAG.captures_iter(&html[start..]) {
        let Some(tag) = caps.get(0) else { continue };
        if caps[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return &html[start..start + tag.start()];
            }
        }
    }
    &html[start..]
}
