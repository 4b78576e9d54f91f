//! One-URL-per-line configuration format
//!
//! ```text
//! # comment
//! ; comment
//! json://localhost/hook
//! ops, db = mmosts://host/token
//! ```

use crate::handlers::parse_list;
use tracing::trace;

/// A single URL line with its tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    /// 1-based line number
    pub line: usize,
    pub tags: Vec<String>,
    pub url: String,
}

/// Parse text configuration into entries.
///
/// Blank lines, `#` / `;` comments and bare `tags=` lines produce nothing.
/// URLs are not validated here.
pub fn parse_text(content: &str) -> Vec<TextEntry> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| parse_line(index + 1, raw))
        .collect()
}

fn parse_line(line: usize, raw: &str) -> Option<TextEntry> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('#') || text.starts_with(';') {
        return None;
    }

    let Some(scheme_end) = text.find("://") else {
        if text.ends_with('=') {
            trace!(line, "Ignoring tag-only line");
            return None;
        }
        return Some(TextEntry {
            line,
            tags: Vec::new(),
            url: text.to_string(),
        });
    };

    let (tags, url) = match text[..scheme_end].rfind('=') {
        Some(split) => (parse_list([&text[..split]]), text[split + 1..].trim()),
        None => (Vec::new(), text),
    };

    trace!(line, url, tags = ?tags, "Parsed configuration line");
    Some(TextEntry {
        line,
        tags,
        url: url.to_string(),
    })
}
