//! Article context embedded in the system message

use crate::config::ChatSettings;
use crate::ocr::{sanitize, OcrRun, OcrStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));

const OCR_HEADER: &str = "\n\n--- Extracted Text from Images ---\n";

const GREETING_WITH_IMAGES: &str =
    "Hello! I have read the article content and extracted text from the images. Ask me anything about it!";
const GREETING: &str =
    "Hello! I am your AI assistant. I have read the article content. Ask me anything about it!";

/// Replace every tag with a space
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, " ").into_owned()
}

/// The first `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// What the assistant knows about the article
#[derive(Debug, Clone, Default)]
pub struct ArticleContext {
    /// Article body HTML
    pub article_html: String,
    /// Assembled OCR text, sanitized when the prompt is built
    pub ocr_text: String,
    /// Whether at least one image yielded text
    pub images_recognized: bool,
}

impl ArticleContext {
    /// Context for an article without OCR text
    pub fn new(article_html: impl Into<String>) -> Self {
        Self {
            article_html: article_html.into(),
            ocr_text: String::new(),
            images_recognized: false,
        }
    }

    /// Attach already recognized OCR text
    pub fn with_ocr_text(mut self, ocr_text: impl Into<String>) -> Self {
        self.ocr_text = ocr_text.into();
        self.images_recognized = self.has_ocr_text();
        self
    }

    /// Attach the text of an OCR run
    ///
    /// Failure annotations still go into the prompt, but only a run with a
    /// successful image counts as recognized.
    pub fn with_ocr_run(mut self, run: &OcrRun) -> Self {
        self.ocr_text = run.context_text();
        self.images_recognized = run.count(OcrStatus::Success) > 0;
        self
    }

    /// Whether any OCR text is available
    pub fn has_ocr_text(&self) -> bool {
        !self.ocr_text.trim().is_empty()
    }

    /// Build the system message text
    pub fn system_prompt(&self, limits: &ChatSettings) -> String {
        let article = strip_tags(&self.article_html);
        let mut context = truncate_chars(&article, limits.article_context_chars).to_string();

        if self.has_ocr_text() {
            let ocr = sanitize(&self.ocr_text);
            context.push_str(OCR_HEADER);
            context.push_str(truncate_chars(&ocr, limits.ocr_context_chars));
        }

        format!(
            "You are a helpful AI assistant. You are answering questions about the following article content:\n\n{}\n\nPlease answer the user's question based on this content. If the answer is not in the text, please state that.",
            context
        )
    }

    /// Opening assistant message
    pub fn greeting(&self) -> &'static str {
        if self.images_recognized {
            GREETING_WITH_IMAGES
        } else {
            GREETING
        }
    }
}
