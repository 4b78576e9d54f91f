//! Body formats, markup conversion and length limits

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Indicator appended to truncated bodies when it fits.
pub const TRUNCATION_INDICATOR: &str = "...";

/// Rejected value for one of the enumerated URL arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {what} '{value}'")]
pub struct ParseChoiceError {
    pub what: &'static str,
    pub value: String,
}

/// Markup of a notification body
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotifyFormat {
    #[default]
    Text,
    Html,
    Markdown,
}

impl NotifyFormat {
    pub const ALL: &'static [NotifyFormat] =
        &[NotifyFormat::Text, NotifyFormat::Html, NotifyFormat::Markdown];

    /// Degradation order, richest first.
    const DEGRADATION: [NotifyFormat; 3] =
        [NotifyFormat::Markdown, NotifyFormat::Html, NotifyFormat::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyFormat::Text => "text",
            NotifyFormat::Html => "html",
            NotifyFormat::Markdown => "markdown",
        }
    }
}

impl fmt::Display for NotifyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyFormat {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(NotifyFormat::Text),
            "html" => Ok(NotifyFormat::Html),
            "markdown" | "md" => Ok(NotifyFormat::Markdown),
            _ => Err(ParseChoiceError {
                what: "format",
                value: s.to_string(),
            }),
        }
    }
}

/// What to do with a body longer than the handler accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    /// Pass the body through and let the service decide.
    Upstream,
    /// Cut the body at the limit.
    #[default]
    Truncate,
    /// Deliver the body as several consecutive messages.
    Split,
}

impl OverflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowMode::Upstream => "upstream",
            OverflowMode::Truncate => "truncate",
            OverflowMode::Split => "split",
        }
    }
}

impl fmt::Display for OverflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowMode {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstream" => Ok(OverflowMode::Upstream),
            "truncate" => Ok(OverflowMode::Truncate),
            "split" => Ok(OverflowMode::Split),
            _ => Err(ParseChoiceError {
                what: "overflow mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Pick the format a handler will receive.
///
/// The requested format wins when supported. Otherwise walk down
/// markdown -> html -> text from the requested format and take the first
/// supported one; if none is, fall back to the handler's native format.
pub fn negotiate(
    requested: NotifyFormat,
    supported: &[NotifyFormat],
    native: NotifyFormat,
) -> NotifyFormat {
    NotifyFormat::DEGRADATION
        .iter()
        .skip_while(|format| **format != requested)
        .find(|format| supported.contains(format))
        .copied()
        .unwrap_or(native)
}

/// Convert `text` written in `from` into `to`.
pub fn convert(text: &str, from: NotifyFormat, to: NotifyFormat) -> Cow<'_, str> {
    match (from, to) {
        (NotifyFormat::Markdown, NotifyFormat::Html) => Cow::Owned(markdown_to_html(text)),
        (NotifyFormat::Markdown, NotifyFormat::Text) => Cow::Owned(markdown_to_text(text)),
        (NotifyFormat::Html, NotifyFormat::Text) => Cow::Owned(html_to_text(text)),
        (NotifyFormat::Text, NotifyFormat::Html) => Cow::Owned(escape_html(text, true)),
        // Plain text and HTML are both valid markdown input
        _ => Cow::Borrowed(text),
    }
}

/// Escape text for inclusion in HTML.
///
/// Tabs and spaces become `&emsp;` / `&nbsp;` so layout survives; newlines
/// become `<br/>` when `convert_newlines` is set.
pub fn escape_html(text: &str, convert_newlines: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push_str("&emsp;"),
            ' ' => out.push_str("&nbsp;"),
            '\n' if convert_newlines => out.push_str("<br/>"),
            _ => out.push(c),
        }
    }
    out
}

type Rules = LazyLock<Vec<(Regex, &'static str)>>;

fn compile(rules: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    rules
        .iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, *replacement))
        })
        .collect()
}

fn apply(rules: &[(Regex, &'static str)], text: &str) -> String {
    rules.iter().fold(text.to_string(), |acc, (re, replacement)| {
        re.replace_all(&acc, *replacement).into_owned()
    })
}

static MARKDOWN_TO_HTML: Rules = LazyLock::new(|| {
    compile(&[
        (r"(?m)^######&nbsp;(.+)$", "<h6>$1</h6>"),
        (r"(?m)^#####&nbsp;(.+)$", "<h5>$1</h5>"),
        (r"(?m)^####&nbsp;(.+)$", "<h4>$1</h4>"),
        (r"(?m)^###&nbsp;(.+)$", "<h3>$1</h3>"),
        (r"(?m)^##&nbsp;(.+)$", "<h2>$1</h2>"),
        (r"(?m)^#&nbsp;(.+)$", "<h1>$1</h1>"),
        (r"\*\*(.+?)\*\*", "<b>$1</b>"),
        (r"__(.+?)__", "<b>$1</b>"),
        (r"\*(.+?)\*", "<i>$1</i>"),
        (r"`(.+?)`", "<code>$1</code>"),
        (r"\[(.+?)\]\((.+?)\)", "<a href=\"$2\">$1</a>"),
        (r"\n", "<br/>"),
    ])
});

static MARKDOWN_TO_TEXT: Rules = LazyLock::new(|| {
    compile(&[
        (r"(?m)^#{1,6}\s+", ""),
        (r"\*\*(.+?)\*\*", "$1"),
        (r"__(.+?)__", "$1"),
        (r"\*(.+?)\*", "$1"),
        (r"`(.+?)`", "$1"),
        (r"\[(.+?)\]\((.+?)\)", "$1 ($2)"),
    ])
});

static HTML_TO_TEXT: Rules = LazyLock::new(|| {
    compile(&[
        (r"(?i)<br\s*/?>", "\n"),
        (r"(?i)</(p|div|h[1-6]|li|tr)>", "\n"),
        (r"<[^>]+>", ""),
        (r"&lt;", "<"),
        (r"&gt;", ">"),
        (r"&quot;", "\""),
        (r"&apos;", "'"),
        (r"&nbsp;", " "),
        (r"&emsp;", "\t"),
        // last so decoded entities are not decoded twice
        (r"&amp;", "&"),
    ])
});

/// Render basic markdown (headings, emphasis, code, links) as HTML.
pub fn markdown_to_html(text: &str) -> String {
    apply(&MARKDOWN_TO_HTML, &escape_html(text, false))
}

/// Strip markdown markup, keeping link targets in parentheses.
pub fn markdown_to_text(text: &str) -> String {
    apply(&MARKDOWN_TO_TEXT, text)
}

/// Strip tags and decode the common entities.
pub fn html_to_text(text: &str) -> String {
    apply(&HTML_TO_TEXT, text).trim_end().to_string()
}

/// Fold a title into the body for handlers without a title field.
pub fn fold_title(title: &str, body: &str, format: NotifyFormat) -> String {
    let title = title.trim();
    if title.is_empty() {
        return body.to_string();
    }
    match format {
        NotifyFormat::Text => format!("{title}\r\n{body}"),
        NotifyFormat::Markdown => format!("# {title}\r\n{body}"),
        NotifyFormat::Html => format!("<b>{title}</b><br/>\r\n{body}"),
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Cut `text` to at most `max` bytes on a character boundary.
///
/// A `max` of zero means unlimited.
pub fn clip(text: &str, max: usize) -> &str {
    if max == 0 {
        return text;
    }
    &text[..floor_char_boundary(text, max)]
}

/// Cut `text` to at most `max` bytes, marking the cut with
/// [`TRUNCATION_INDICATOR`] when there is room for it.
///
/// A `max` of zero means unlimited.
pub fn truncate(text: &str, max: usize) -> Cow<'_, str> {
    if max == 0 || text.len() <= max {
        return Cow::Borrowed(text);
    }
    if max <= TRUNCATION_INDICATOR.len() {
        return Cow::Borrowed(clip(text, max));
    }
    let kept = clip(text, max - TRUNCATION_INDICATOR.len());
    if kept.is_empty() {
        return Cow::Borrowed(clip(text, max));
    }
    Cow::Owned(format!("{kept}{TRUNCATION_INDICATOR}"))
}

/// Split `text` into chunks of at most `max` bytes.
///
/// Chunks break after the last newline or space in their second half when
/// there is one, otherwise at the last character boundary. A character
/// wider than `max` is emitted whole so the split always progresses.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    if max == 0 || text.len() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= max {
            chunks.push(rest.to_string());
            break;
        }

        let mut end = floor_char_boundary(rest, max);
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        } else if let Some(pos) = rest[..end].rfind(['\n', ' ']) {
            if pos >= end / 2 {
                end = pos + 1;
            }
        }

        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    chunks
}
