//! Assembly of OCR results into chat context text

use super::{OcrResult, OcrStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static REF_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<\|ref\|>(.*?)<\|/ref\|>").expect("valid ref pattern"));
static DET_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<\|det\|>.*?<\|/det\|>").expect("valid det pattern"));
static SPECIAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\|[^|<>]*\|>").expect("valid token pattern"));
static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\p{Emoji_Modifier}\p{Regional_Indicator}\x{FE0E}\x{FE0F}\x{200D}\x{20E3}]")
        .expect("valid emoji pattern")
});

/// Concatenate results into one annotated text blob
///
/// Entries are numbered from 1. Pending entries and successful entries
/// without text contribute nothing.
pub fn assemble(results: &[OcrResult]) -> String {
    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        let n = i + 1;
        match result.status {
            OcrStatus::Success if !result.text.is_empty() => {
                out.push_str(&format!("\n[Image {} Content]:\n{}\n", n, result.text));
            }
            OcrStatus::Error => {
                out.push_str(&format!(
                    "\n[Image {} Content]: (识别失败: {})\n",
                    n,
                    result.error.as_deref().unwrap_or_default()
                ));
            }
            OcrStatus::Processing => {
                out.push_str(&format!("\n[Image {} Content]: (正在识别...)\n", n));
            }
            _ => {}
        }
    }
    out
}

/// Remove model markup tokens and emoji from OCR text
///
/// Reference wrappers keep their inner text; detection coordinate blocks
/// are dropped entirely.
pub fn sanitize(text: &str) -> String {
    let text = REF_TAG.replace_all(text, "$1");
    let text = DET_BLOCK.replace_all(&text, "");
    let text = SPECIAL_TOKEN.replace_all(&text, "");
    EMOJI.replace_all(&text, "").into_owned()
}
