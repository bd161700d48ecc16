//! Small text, URL and filesystem helpers.
//!
//! - Whitespace normalization for scraped text
//! - Character-safe truncation for stored content and log previews
//! - Relative link resolution against a source's base address
//! - Database directory preparation

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};
use url::Url;

use crate::error::Result;

/// Appended to content that was cut at the length cap.
pub const TRUNCATION_MARKER: &str = "...";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse every run of whitespace into a single space and trim the ends.
///
/// Listing pages often split a headline across several text nodes with
/// newlines and indentation in between; this turns them back into one line.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Cap `content` at `max_chars` characters.
///
/// Content longer than the cap keeps its first `max_chars` characters and gets
/// [`TRUNCATION_MARKER`] appended, so the result is at most
/// `max_chars + 3` characters long. Shorter content is returned unchanged.
///
/// Lengths are counted in `char`s, not bytes, so multi-byte text is never
/// split inside a code point.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_content("short", 500), "short");
/// assert_eq!(truncate_content(&"a".repeat(600), 500).chars().count(), 503);
/// ```
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((cut, _)) => format!("{}{}", &content[..cut], TRUNCATION_MARKER),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped characters appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} chars)", &s[..cut], s[cut..].chars().count()),
    }
}

/// Resolve an `href` found on a listing page against the source's base address.
///
/// Absolute links pass through unchanged (apart from normalization by the
/// `url` crate); relative and protocol-relative links are joined onto `base`.
pub fn resolve_url(base: &Url, href: &str) -> Result<String> {
    Ok(base.join(href.trim())?.to_string())
}

/// Make sure the directory holding an SQLite database file exists.
///
/// Accepts `sqlite:` / `sqlite://` URLs as well as bare paths. In-memory
/// databases and paths without a parent directory are left alone.
#[instrument(level = "debug", skip_all, fields(database_url = %database_url))]
pub async fn ensure_database_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
            debug!(dir = %parent.display(), "Database directory ready");
        }
    }
    Ok(())
}
