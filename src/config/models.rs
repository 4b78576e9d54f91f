use crate::dispatch::{Concurrency, DispatchOptions, RetryPolicy, ThrottleMode};
use crate::handlers::{AppAsset, HandlerOverrides, NotifyFormat};
use crate::http::HttpConfig;
use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};

/// Top-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Target URLs, one entry per line of the text configuration format
    /// (`tag1,tag2=url` prefixes allowed)
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Executor behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchSettings {
    /// Handlers delivering at once; 0 means one after the other
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,
    #[serde(default)]
    pub throttle_mode: ThrottleMode,
    pub max_attachment_bytes: Option<ByteSize>,
    /// Body format forced on every handler unless its URL sets `format=`
    pub format: Option<NotifyFormat>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout: default_timeout(),
            throttle_mode: ThrottleMode::default(),
            max_attachment_bytes: None,
            format: None,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Retry policy for retryable delivery failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: HumanDuration,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: HumanDuration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_max_backoff() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

/// HTTP client used by webhook handlers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: None,
        }
    }
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

/// Identity shown to receiving services
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppSettings {
    #[serde(default = "default_app_id")]
    pub id: String,
    /// Icon URL template with `{TYPE}` and `{XY}` placeholders
    pub image_url_mask: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            id: default_app_id(),
            image_url_mask: None,
        }
    }
}

fn default_app_id() -> String {
    AppAsset::default().app_id
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "notifybox=info".to_string()
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: self.initial_backoff.into(),
            max_backoff: self.max_backoff.into(),
            multiplier: self.multiplier,
        }
    }
}

impl Settings {
    /// Executor options described by the `dispatch` and `retry` sections
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            concurrency: match self.dispatch.concurrency {
                0 => Concurrency::Sequential,
                cap => Concurrency::Bounded(cap),
            },
            timeout: self.dispatch.timeout.into(),
            retry: self.retry.policy(),
            throttle_mode: self.dispatch.throttle_mode,
            dry_run: false,
            max_attachment_bytes: self.dispatch.max_attachment_bytes.map(|b| b.as_u64()),
        }
    }

    /// Settings handed to every handler constructor
    pub fn handler_overrides(&self) -> HandlerOverrides {
        let mut http = HttpConfig {
            connect_timeout: self.http.connect_timeout.into(),
            request_timeout: self.http.request_timeout.into(),
            ..HttpConfig::default()
        };
        if let Some(user_agent) = &self.http.user_agent {
            http.user_agent = user_agent.clone();
        }

        HandlerOverrides {
            http,
            asset: AppAsset {
                app_id: self.app.id.clone(),
                image_url_mask: self.app.image_url_mask.clone(),
            },
            format: self.dispatch.format,
        }
    }
}
