use std::fmt;

use super::codec::quote;
use super::query::QueryParams;

/// Placeholder written in place of secrets by redacted renderings.
pub const REDACTED: &str = "****";

/// Structured form of a notification URL
///
/// Produced by [`parse`](super::parse) or [`UrlBuilder`]; immutable
/// afterwards. `Display` renders a canonical string that parses back to an
/// equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub(super) scheme: String,
    pub(super) host: String,
    pub(super) port: Option<u16>,
    pub(super) user: Option<String>,
    pub(super) password: Option<String>,
    pub(super) path: Vec<String>,
    pub(super) trailing_slash: bool,
    pub(super) query: QueryParams,
    pub(super) fragment: Option<String>,
}

impl ParsedUrl {
    /// Lower-cased scheme
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Decoded host, possibly empty
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Decoded, non-empty path segments
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Canonical rendering with the password masked.
    pub fn redacted(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.render(&mut out, true);
        out
    }

    fn render(&self, f: &mut impl fmt::Write, mask_password: bool) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;

        if self.user.is_some() || self.password.is_some() {
            if let Some(user) = &self.user {
                f.write_str(&quote(user))?;
            }
            if let Some(password) = &self.password {
                if mask_password {
                    write!(f, ":{REDACTED}")?;
                } else {
                    write!(f, ":{}", quote(password))?;
                }
            }
            f.write_str("@")?;
        }

        // Bracketed IPv6 literals are written as-is
        if self.host.starts_with('[') {
            f.write_str(&self.host)?;
        } else {
            f.write_str(&quote(&self.host))?;
        }

        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }

        for segment in &self.path {
            write!(f, "/{}", quote(segment))?;
        }
        if self.trailing_slash {
            f.write_str("/")?;
        }

        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{}={}", quote(key), quote(value))?;
        }

        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", quote(fragment))?;
        }

        Ok(())
    }
}

impl fmt::Display for ParsedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, false)
    }
}

/// Builder used by handlers to render their canonical URL
///
/// ```rust
/// use notifybox::url::UrlBuilder;
///
/// let url = UrlBuilder::new("mmosts")
///     .user("bot")
///     .host("chat.example.com")
///     .segment("abc123")
///     .param("channel", "alerts")
///     .build();
/// assert_eq!(url.to_string(), "mmosts://bot@chat.example.com/abc123?channel=alerts");
/// ```
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    url: ParsedUrl,
}

impl UrlBuilder {
    pub fn new(scheme: &str) -> Self {
        Self {
            url: ParsedUrl {
                scheme: scheme.to_ascii_lowercase(),
                host: String::new(),
                port: None,
                user: None,
                password: None,
                path: Vec::new(),
                trailing_slash: false,
                query: QueryParams::new(),
                fragment: None,
            },
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.url.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.url.password = Some(password.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.url.host = host.into();
        self
    }

    pub fn port(mut self, port: Option<u16>) -> Self {
        self.url.port = port;
        self
    }

    /// Append one path segment; empty segments are ignored.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        if !segment.is_empty() {
            self.url.path.push(segment);
        }
        self
    }

    pub fn trailing_slash(mut self, trailing_slash: bool) -> Self {
        self.url.trailing_slash = trailing_slash;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.url.query.push(key, value);
        self
    }

    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.url.fragment = Some(fragment.into());
        self
    }

    pub fn build(self) -> ParsedUrl {
        self.url
    }
}

impl From<ParsedUrl> for UrlBuilder {
    fn from(url: ParsedUrl) -> Self {
        Self { url }
    }
}
