//! Archive of saved articles
//!
//! The archive is a directory with one subdirectory per article. Each
//! article directory holds the saved page as an `.html` file plus its
//! images (`image_1.jpg`, `image_2.png`, ...). The directory name is the
//! article id.

pub mod extract;
pub mod rewrite;
pub mod timeline;
pub mod toc;

pub use extract::{extract, extract_body, is_original, iso_utc, Field};
pub use rewrite::rewrite_images;
pub use timeline::{build_timeline, MonthSlot, MonthState};
pub use toc::{GuideItem, GuideMappings, TocEntry};

use crate::config::ArticlesConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static COVER_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^image_1\.(jpeg|jpg|png|webp)$").expect("valid cover pattern")
});

/// Summary of one archived article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Directory name
    pub id: String,
    /// Title, or the id when the page has none
    pub title: String,
    /// Publication time, ISO-8601 UTC with milliseconds
    pub date: String,
    /// Public path of the cover image, empty when there is none
    pub cover_image: String,
    /// Reader path of the article
    pub url: String,
    /// Publishing account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    /// Author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Whether the article is marked original
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_original: Option<bool>,
    /// Publication location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Table of contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toc: Option<Vec<TocEntry>>,
}

/// An article with its rewritten body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleData {
    /// Metadata
    #[serde(flatten)]
    pub article: Article,
    /// Body HTML with anchors injected and image paths rewritten
    pub content_html: String,
}

/// Saved page of one article
struct Source {
    id: String,
    html: String,
    html_path: PathBuf,
    files: Vec<String>,
}

/// Read access to the article archive
#[derive(Debug, Clone)]
pub struct ArticleRepository {
    root: PathBuf,
    public_prefix: String,
    guides: GuideMappings,
}

impl ArticleRepository {
    /// Repository over `root`, publishing assets under `public_prefix`
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>, guides: GuideMappings) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
            guides,
        }
    }

    /// Repository described by the application configuration
    ///
    /// Uses the configured guide mapping file, or the built-in mapping.
    ///
    /// # Errors
    ///
    /// Returns error if the guide mapping cannot be loaded
    pub fn from_config(config: &ArticlesConfig) -> Result<Self> {
        let guides = match &config.guide_mapping {
            Some(path) => GuideMappings::load(path)?,
            None => GuideMappings::builtin()?,
        };
        Ok(Self::new(&config.root, &config.public_prefix, guides))
    }

    /// Archive root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prefix under which article assets are published
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Every article, newest first
    ///
    /// Entries that are not directories, have no HTML file, or cannot be
    /// read are skipped.
    pub fn list(&self) -> Vec<Article> {
        let mut articles: Vec<Article> = self
            .ids()
            .into_iter()
            .filter_map(|id| match self.read_source(&id) {
                Ok(Some(source)) => Some(self.summarize(&source)),
                Ok(None) => None,
                Err(e) => {
                    tracing::error!("Error reading article {}: {}", id, e);
                    None
                }
            })
            .collect();

        articles.sort_by(|a, b| b.date.cmp(&a.date));
        articles
    }

    /// Ids of every article directory
    pub fn ids(&self) -> Vec<String> {
        if !self.root.is_dir() {
            tracing::warn!("Articles directory not found at {}", self.root.display());
            return Vec::new();
        }

        let mut ids: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    /// Full article by id
    ///
    /// The id is percent-decoded before use. Returns `None` when no such
    /// article exists.
    pub fn get(&self, id: &str) -> Option<ArticleData> {
        let decoded = percent_decode(id);
        match self.read_source(&decoded) {
            Ok(Some(source)) => Some(self.render(&source)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Error reading article {}: {}", decoded, e);
                None
            }
        }
    }

    /// Find an article by id as given, then by its decoded form
    pub fn lookup(&self, id: &str) -> Option<ArticleData> {
        self.get(id).or_else(|| {
            let decoded = percent_decode(id);
            (decoded != id).then(|| self.get(&decoded)).flatten()
        })
    }

    /// Directory holding the article `id`
    pub fn article_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Public path prefix of the article's assets
    pub fn asset_base(&self, id: &str) -> String {
        format!("{}/{}", self.public_prefix, urlencoding::encode(id))
    }

    fn read_source(&self, id: &str) -> Result<Option<Source>> {
        if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\\') {
            return Ok(None);
        }

        let dir = self.article_dir(id);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut files: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        files.sort();

        let Some(html_file) = files.iter().find(|f| f.ends_with(".html")) else {
            return Ok(None);
        };
        let html_path = dir.join(html_file);
        let html = std::fs::read_to_string(&html_path)?;

        Ok(Some(Source {
            id: id.to_string(),
            html,
            html_path,
            files,
        }))
    }

    fn summarize(&self, source: &Source) -> Article {
        let html = &source.html;
        let date = extract(html, Field::Date).unwrap_or_else(|| modified_iso(&source.html_path));
        let cover_image = source
            .files
            .iter()
            .find(|f| COVER_IMAGE.is_match(f))
            .map(|f| format!("{}/{}", self.asset_base(&source.id), f))
            .unwrap_or_default();

        Article {
            id: source.id.clone(),
            title: extract(html, Field::Title).unwrap_or_else(|| source.id.clone()),
            date,
            cover_image,
            url: format!("/article/{}", source.id),
            account_name: extract(html, Field::AccountName),
            author: extract(html, Field::Author),
            is_original: Some(is_original(html)),
            location: None,
            toc: None,
        }
    }

    fn render(&self, source: &Source) -> ArticleData {
        let mut article = self.summarize(source);
        article.location = extract(&source.html, Field::Location);

        let mut toc = Vec::new();
        let body = extract_body(&source.html);
        let mut content = toc::inject_heading_anchors(body, &mut toc);
        if let Some(items) = self.guides.get(&article.title) {
            content = toc::inject_guide_anchors(&content, items, &mut toc);
        }
        let content_html = rewrite_images(&content, &self.asset_base(&source.id));

        article.toc = Some(toc);
        ArticleData {
            article,
            content_html,
        }
    }
}

fn percent_decode(id: &str) -> String {
    urlencoding::decode(id)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| id.to_string())
}

fn modified_iso(path: &Path) -> String {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    iso_utc(&modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_article;
    use tempfile::TempDir;

    fn repo(root: &Path) -> ArticleRepository {
        ArticleRepository::new(root, "/articles", GuideMappings::builtin().unwrap())
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir.path().join("absent"));
        assert!(repo.list().is_empty());
        assert!(repo.ids().is_empty());
    }

    #[test]
    fn test_list_sorted_newest_first_and_skips_non_articles() {
        let dir = TempDir::new().unwrap();
        write_article(dir.path(), "old", r#"<title>Old</title><script>var ct = "1600000000";</script>"#, &[]);
        write_article(dir.path(), "new", r#"<title>New</title><script>var ct = "1700000000";</script>"#, &[]);
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let articles = repo(dir.path()).list();
        let ids: Vec<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(articles[0].title, "New");
    }

    #[test]
    fn test_summary_fields() {
        let dir = TempDir::new().unwrap();
        write_article(
            dir.path(),
            "2024-01-01 测试",
            r#"<html><script>var nickname = "Acct";</script><div id="js_content"><p>原创</p></div></html>"#,
            &["image_1.JPG", "image_2.png"],
        );

        let article = &repo(dir.path()).list()[0];
        assert_eq!(article.title, "2024-01-01 测试");
        assert_eq!(
            article.cover_image,
            "/articles/2024-01-01%20%E6%B5%8B%E8%AF%95/image_1.JPG"
        );
        assert_eq!(article.url, "/article/2024-01-01 测试");
        assert_eq!(article.account_name.as_deref(), Some("Acct"));
        assert_eq!(article.is_original, Some(true));
        assert!(article.date.ends_with('Z'));
        assert!(article.location.is_none());
    }

    #[test]
    fn test_get_renders_body() {
        let dir = TempDir::new().unwrap();
        write_article(
            dir.path(),
            "a1",
            r#"<title>T</title><script>ip_wording2: "上海"</script><div id="js_content"><h2>Intro</h2><img data-ratio="2" src="image_2.png"></div><footer>f</footer>"#,
            &[],
        );

        let data = repo(dir.path()).get("a1").unwrap();
        assert_eq!(data.article.location.as_deref(), Some("上海"));
        assert_eq!(
            data.article.toc,
            Some(vec![TocEntry {
                id: "toc-1".into(),
                text: "Intro".into(),
                level: 2
            }])
        );
        assert!(data.content_html.contains(r#"src="/articles/a1/image_2.png""#));
        assert!(data.content_html.contains("aspect-ratio: 1 / 2;"));
        assert!(!data.content_html.contains("footer"));
    }

    #[test]
    fn test_get_applies_guide_mapping() {
        let dir = TempDir::new().unwrap();
        write_article(
            dir.path(),
            "guide",
            r#"<title>2026年1月组织生活指南</title><div id="js_content"><img src="image_3.png"><img src="image_31.jpg"></div>"#,
            &[],
        );

        let data = repo(dir.path()).get("guide").unwrap();
        let toc = data.article.toc.unwrap();
        assert_eq!(toc.len(), 4);
        assert_eq!(toc[0].id, "toc-理论充电站");
        assert!(data.content_html.contains(r#"<div id="toc-温馨提示""#));
        assert!(data.content_html.contains(r#"src="/articles/guide/image_31.jpg""#));
    }

    #[test]
    fn test_lookup_decodes_id() {
        let dir = TempDir::new().unwrap();
        write_article(dir.path(), "测试", "<title>X</title>", &[]);
        let repo = repo(dir.path());

        assert!(repo.lookup("%E6%B5%8B%E8%AF%95").is_some());
        assert!(repo.lookup("测试").is_some());
        assert!(repo.lookup("missing").is_none());
        assert!(repo.lookup("../etc").is_none());
    }
}
