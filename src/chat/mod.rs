//! Chat about an article
//!
//! [`ChatSession`] keeps the conversation and drives streaming replies;
//! [`ArticleContext`] turns the article and its OCR text into the system
//! message.

pub mod context;
pub mod session;

pub use context::{strip_tags, truncate_chars, ArticleContext};
pub use session::{ChatSession, SendOutcome, SessionState, STOPPED_MARKER};
