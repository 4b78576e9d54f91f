use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::format::{NotifyFormat, ParseChoiceError};
use super::traits::{NotifyHandler, ValidationError};
use crate::attachment::Attachment;
use crate::http::HttpConfig;
use crate::url::{ParseOptions, ParsedUrl};

/// Severity of a notification
///
/// Only influences presentation hints (color, icon, marker); never
/// delivery semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyType {
    #[default]
    Info,
    Success,
    Warning,
    Failure,
}

impl NotifyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyType::Info => "info",
            NotifyType::Success => "success",
            NotifyType::Warning => "warning",
            NotifyType::Failure => "failure",
        }
    }

    /// Default HTML color
    pub fn color(&self) -> &'static str {
        match self {
            NotifyType::Info => "#3AA3E3",
            NotifyType::Success => "#3AA35F",
            NotifyType::Warning => "#CACF29",
            NotifyType::Failure => "#A32037",
        }
    }

    /// Marker for plain-text destinations
    pub fn ascii(&self) -> &'static str {
        match self {
            NotifyType::Info => "[i]",
            NotifyType::Success => "[+]",
            NotifyType::Warning => "[~]",
            NotifyType::Failure => "[!]",
        }
    }
}

impl fmt::Display for NotifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyType {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(NotifyType::Info),
            "success" => Ok(NotifyType::Success),
            "warning" => Ok(NotifyType::Warning),
            "failure" => Ok(NotifyType::Failure),
            _ => Err(ParseChoiceError {
                what: "notification type",
                value: s.to_string(),
            }),
        }
    }
}

/// A message as the caller submits it
///
/// ```rust
/// use notifybox::handlers::{NotifyFormat, NotifyRequest, NotifyType};
///
/// let request = NotifyRequest::builder()
///     .body("disk at 91%")
///     .title("backup-01")
///     .notify_type(NotifyType::Warning)
///     .format(NotifyFormat::Markdown)
///     .build();
/// assert_eq!(request.title, "backup-01");
/// assert!(request.attachments.is_empty());
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct NotifyRequest {
    #[builder(into)]
    pub body: String,
    #[builder(into, default)]
    pub title: String,
    #[builder(default)]
    pub notify_type: NotifyType,
    /// Format the body and title are written in
    #[builder(default)]
    pub format: NotifyFormat,
    #[builder(default)]
    pub attachments: Vec<Arc<dyn Attachment>>,
}

/// A message after negotiation and length limits, ready for one handler
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    /// Empty when the handler has no title field
    pub title: String,
    pub body: String,
    pub notify_type: NotifyType,
    pub format: NotifyFormat,
    pub attachments: Vec<Arc<dyn Attachment>>,
}

/// Application identity some handlers show to the receiving service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppAsset {
    pub app_id: String,
    /// Icon URL template; `{TYPE}` and `{XY}` are substituted
    pub image_url_mask: Option<String>,
}

impl Default for AppAsset {
    fn default() -> Self {
        Self {
            app_id: "Notifybox".to_string(),
            image_url_mask: None,
        }
    }
}

impl AppAsset {
    /// Icon URL for `notify_type` at `size` (e.g. `"72x72"`).
    pub fn image_url(&self, notify_type: NotifyType, size: &str) -> Option<String> {
        self.image_url_mask.as_ref().map(|mask| {
            mask.replace("{TYPE}", notify_type.as_str())
                .replace("{XY}", size)
        })
    }
}

/// Settings applied to every handler built from a URL
#[derive(Debug, Clone, Default)]
pub struct HandlerOverrides {
    pub http: HttpConfig,
    pub asset: AppAsset,
    /// Body format forced on handlers, unless the URL sets `format=`
    pub format: Option<NotifyFormat>,
}

/// Declared capabilities of a handler type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Maximum body length in bytes; 0 means unlimited
    pub max_body_length: usize,
    /// Maximum title length in bytes; 0 means the title is folded into the
    /// body
    pub title_maxlen: usize,
    pub body_formats: &'static [NotifyFormat],
    pub native_format: NotifyFormat,
    /// Minimum spacing between deliveries through one instance
    pub throttle_interval: Duration,
    pub attachment_support: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_body_length: 32768,
            title_maxlen: 250,
            body_formats: NotifyFormat::ALL,
            native_format: NotifyFormat::Text,
            throttle_interval: Duration::ZERO,
            attachment_support: false,
        }
    }
}

/// Builds a handler from a parsed URL
pub type Constructor = Arc<
    dyn Fn(&ParsedUrl, &HandlerOverrides) -> Result<Box<dyn NotifyHandler>, ValidationError>
        + Send
        + Sync,
>;

/// Rewrites a vendor's own webhook URL into this handler's scheme
pub type NativeUrlRewriter = fn(&str) -> Option<String>;

/// Registry entry for one handler type
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub service_name: &'static str,
    pub service_url: Option<&'static str>,
    /// Plain schemes, the first one being the default
    pub schemes: &'static [&'static str],
    /// TLS variants of the schemes
    pub secure_schemes: &'static [&'static str],
    pub capabilities: Capabilities,
    pub parse_options: ParseOptions,
    pub construct: Constructor,
    pub native_url: Option<NativeUrlRewriter>,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("service_name", &self.service_name)
            .field("schemes", &self.schemes)
            .field("secure_schemes", &self.secure_schemes)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl HandlerDescriptor {
    /// Every scheme this descriptor claims.
    pub fn all_schemes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.schemes.iter().chain(self.secure_schemes).copied()
    }

    pub fn is_secure_scheme(&self, scheme: &str) -> bool {
        self.secure_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    pub fn supports_format(&self, format: NotifyFormat) -> bool {
        self.capabilities.body_formats.contains(&format)
    }
}

/// Read a yes/no style URL argument.
///
/// Unknown values fall back to `default`.
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "yes" | "y" | "true" | "1" | "on" | "enable" | "enabled") => {
            true
        }
        Some(v) if matches!(v.as_str(), "no" | "n" | "false" | "0" | "off" | "disable" | "disabled") => {
            false
        }
        _ => default,
    }
}

/// Split a `a, b c` style list argument into its non-empty items.
pub fn parse_list<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .flat_map(|value| value.split([',', ' ', ';']))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
