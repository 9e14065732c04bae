//! Table of contents generation
//!
//! Two strategies feed the table of contents. Headings `<h2>` to `<h4>` get
//! numbered `toc-N` anchors. Guides whose sections are images instead of
//! headings are described by a guide mapping: for each listed image, the
//! `<img>` tag is wrapped in a positioned container holding one anchor per
//! section.

use crate::error::{Result, ReaderError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const BUILTIN_GUIDE_MAPPING: &str = include_str!("../../assets/guide_mapping.yaml");

static HEADING_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<h([2-4])[^>]*>").expect("valid heading pattern"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// One table of contents entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Anchor id in the rewritten HTML
    pub id: String,
    /// Display text
    pub text: String,
    /// Heading level, 2 to 4
    pub level: u8,
}

/// One image-anchored section of a guide
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuideItem {
    /// Image number `N` in `image_N.<ext>`
    pub img: u32,
    /// Section title
    pub text: String,
    /// Heading level
    pub level: u8,
    /// Anchor position as a percentage of the image height
    #[serde(default)]
    pub offset: Option<f64>,
}

/// Guide mappings keyed by article title
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct GuideMappings(HashMap<String, Vec<GuideItem>>);

impl GuideMappings {
    /// The mapping shipped with the crate
    ///
    /// # Errors
    ///
    /// Returns error if the embedded asset does not parse
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_GUIDE_MAPPING)
    }

    /// Parse a mapping from YAML
    ///
    /// # Errors
    ///
    /// Returns error if `yaml` is not a valid mapping
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a mapping from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::Config(format!(
                "Failed to read guide mapping {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&contents)
    }

    /// Sections for the guide titled `title`
    pub fn get(&self, title: &str) -> Option<&[GuideItem]> {
        self.0.get(title).map(Vec::as_slice)
    }

    /// Number of guides described
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no guide is described
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Give every non-empty `<h2>`–`<h4>` a `toc-N` anchor
///
/// `N` counts every heading encountered, including empty ones, which are
/// left unchanged and produce no entry.
pub fn inject_heading_anchors(content: &str, toc: &mut Vec<TocEntry>) -> String {
    let lower = content.to_ascii_lowercase();
    let mut out = String::with_capacity(content.len());
    let mut pos = 0;
    let mut counter = 1;

    while let Some(caps) = HEADING_OPEN.captures(&content[pos..]) {
        let (Some(open), Some(level_match)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let level = level_match.as_str();
        let open_start = pos + open.start();
        let inner_start = pos + open.end();
        let close_tag = format!("</h{}>", level);

        let Some(inner_len) = lower[inner_start..].find(&close_tag) else {
            out.push_str(&content[pos..inner_start]);
            pos = inner_start;
            continue;
        };
        let inner_end = inner_start + inner_len;
        let match_end = inner_end + close_tag.len();
        let inner = &content[inner_start..inner_end];

        out.push_str(&content[pos..open_start]);

        let id = format!("toc-{}", counter);
        counter += 1;
        let plain = TAG.replace_all(inner, "").trim().to_string();
        if plain.is_empty() {
            out.push_str(&content[open_start..match_end]);
        } else {
            toc.push(TocEntry {
                id: id.clone(),
                text: plain,
                level: level.parse().unwrap_or(2),
            });
            out.push_str(&format!(
                r#"<h{level} id="{id}" class="scroll-mt-24">{inner}</h{level}>"#
            ));
        }
        pos = match_end;
    }

    out.push_str(&content[pos..]);
    out
}

/// Wrap the images named by `items` with positioned section anchors
///
/// Items sharing an image share one container. Images are handled in
/// ascending number order; only the first matching tag for each image is
/// wrapped. Items whose image is absent produce no entry.
pub fn inject_guide_anchors(content: &str, items: &[GuideItem], toc: &mut Vec<TocEntry>) -> String {
    let mut grouped: BTreeMap<u32, Vec<&GuideItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.img).or_default().push(item);
    }

    let mut result = content.to_string();
    for (img, group) in grouped {
        let pattern = format!(
            r#"(?i)<img[^>]+(?:src|data-src)="image_{}\.(?:jpeg|jpg|png|webp)"[^>]*>"#,
            img
        );
        let Ok(image_tag) = Regex::new(&pattern) else {
            continue;
        };
        let Some(found) = image_tag.find(&result) else {
            tracing::debug!("Guide image {} not found in article", img);
            continue;
        };

        let anchors: String = group
            .iter()
            .map(|item| {
                let id = format!("toc-{}", WHITESPACE.replace_all(&item.text, "-"));
                toc.push(TocEntry {
                    id: id.clone(),
                    text: item.text.clone(),
                    level: item.level,
                });
                let position = match item.offset {
                    Some(offset) => format!("top: {}%;", offset),
                    None => "top: 0;".to_string(),
                };
                format!(
                    r#"<div id="{id}" style="position: absolute; {position} left: 0; width: 100%; height: 1px; pointer-events: none; scroll-margin-top: 80px;" class="scroll-mt-24"></div>"#
                )
            })
            .collect();

        let range = found.range();
        let wrapped = format!(
            r#"<div style="position: relative; width: 100%; display: block;">{}{}</div>"#,
            anchors,
            found.as_str()
        );
        result.replace_range(range, &wrapped);
    }
    result
}
