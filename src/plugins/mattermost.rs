//! Mattermost incoming webhooks
//!
//! `mmost://[botname@]host[:port][/fullpath]/token` (`mmosts://` for TLS).
//!
//! Arguments: `channel=`, `channels=` and `to=` (merged into one list),
//! `image=yes|no` for the type icon, `verify=no`. Posting to several
//! channels sends one request per channel; the delivery fails if any of
//! them fails, and a retry only posts to the channels that failed.

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::handlers::{
    AppAsset, Capabilities, HandlerDescriptor, HandlerOverrides, NotifyError, NotifyFormat,
    NotifyHandler, PreparedMessage, ValidationError, parse_bool, parse_list,
};
use crate::http::HttpClient;
use crate::url::{ParseOptions, ParsedUrl, REDACTED, UrlBuilder, quote};

const SCHEME: &str = "mmost";
const SECURE_SCHEME: &str = "mmosts";
const IMAGE_SIZE: &str = "72x72";

const BODY_FORMATS: &[NotifyFormat] = &[NotifyFormat::Markdown, NotifyFormat::Text];

static NATIVE_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^http(?P<secure>s?)://(?P<host>mattermost\.[A-Z0-9_.-]+)(:(?P<port>[1-9][0-9]{0,5}))?/hooks/(?P<token>[A-Z0-9_-]+)/?(?P<params>\?.+)?$",
    )
    .ok()
});

pub fn descriptor() -> HandlerDescriptor {
    HandlerDescriptor {
        service_name: "Mattermost",
        service_url: Some("https://mattermost.com/"),
        schemes: &[SCHEME],
        secure_schemes: &[SECURE_SCHEME],
        capabilities: Capabilities {
            max_body_length: 4000,
            title_maxlen: 0,
            body_formats: BODY_FORMATS,
            native_format: NotifyFormat::Markdown,
            attachment_support: false,
            ..Default::default()
        },
        parse_options: ParseOptions::default(),
        construct: std::sync::Arc::new(construct),
        native_url: Some(rewrite_native_url),
    }
}

fn construct(
    url: &ParsedUrl,
    overrides: &HandlerOverrides,
) -> Result<Box<dyn NotifyHandler>, ValidationError> {
    Ok(Box::new(MattermostHandler::new(
        MattermostConfig::from_url(url)?,
        overrides,
    )?))
}

/// Turn `https://mattermost.example.com/hooks/<token>` into `mmosts://`.
pub fn rewrite_native_url(raw: &str) -> Option<String> {
    let captures = NATIVE_URL.as_ref()?.captures(raw.trim())?;
    let scheme = if captures["secure"].is_empty() {
        SCHEME
    } else {
        SECURE_SCHEME
    };
    let port = captures
        .name("port")
        .map(|p| format!(":{}", p.as_str()))
        .unwrap_or_default();
    let params = captures.name("params").map(|p| p.as_str()).unwrap_or("");

    Some(format!(
        "{scheme}://{}{port}/{}/{params}",
        &captures["host"], &captures["token"]
    ))
}

/// Validated `mmost://` configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MattermostConfig {
    pub secure: bool,
    pub host: String,
    pub port: Option<u16>,
    /// Posting name; the application id is used when unset
    pub botname: Option<String>,
    /// Path in front of the token, for installations below a prefix
    pub fullpath: Vec<String>,
    pub token: String,
    pub channels: Vec<String>,
    pub include_image: bool,
    pub verify: bool,
}

impl MattermostConfig {
    pub fn from_url(url: &ParsedUrl) -> Result<Self, ValidationError> {
        if url.host().is_empty() {
            return Err(ValidationError::missing("host"));
        }

        let mut fullpath = url.path().to_vec();
        let token = fullpath
            .pop()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ValidationError::missing("token"))?;
        if token.chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid("token", "contains whitespace"));
        }

        let query = url.query();
        let channels = parse_list(
            ["to", "channel", "channels"]
                .iter()
                .flat_map(|key| query.get_all(key)),
        )
        .into_iter()
        .map(|channel| channel.trim_start_matches('#').to_string())
        .filter(|channel| !channel.is_empty())
        .collect();

        Ok(Self {
            secure: url.scheme() == SECURE_SCHEME,
            host: url.host().to_string(),
            port: url.port(),
            botname: url.user().map(str::to_string),
            fullpath,
            token,
            channels,
            include_image: parse_bool(query.get_ignore_case("image"), true),
            verify: parse_bool(query.get_ignore_case("verify"), true),
        })
    }

    pub fn to_url(&self) -> ParsedUrl {
        let mut builder = UrlBuilder::new(if self.secure { SECURE_SCHEME } else { SCHEME })
            .host(&self.host)
            .port(self.port);
        if let Some(botname) = &self.botname {
            builder = builder.user(botname);
        }
        for segment in &self.fullpath {
            builder = builder.segment(segment);
        }
        builder = builder
            .segment(&self.token)
            .param("image", if self.include_image { "yes" } else { "no" });
        if !self.channels.is_empty() {
            builder = builder.param("channel", self.channels.join(","));
        }
        if !self.verify {
            builder = builder.param("verify", "no");
        }
        builder.build()
    }

    /// Webhook address
    pub fn endpoint(&self) -> String {
        let mut endpoint = format!(
            "{}://{}",
            if self.secure { "https" } else { "http" },
            self.host
        );
        if let Some(port) = self.port {
            endpoint.push_str(&format!(":{port}"));
        }
        for segment in &self.fullpath {
            endpoint.push('/');
            endpoint.push_str(&quote(segment));
        }
        endpoint.push_str("/hooks/");
        endpoint.push_str(&quote(&self.token));
        endpoint
    }
}

pub struct MattermostHandler {
    config: MattermostConfig,
    http: HttpClient,
    asset: AppAsset,
}

impl fmt::Debug for MattermostHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MattermostHandler")
            .field("target", &self.url_redacted())
            .finish()
    }
}

impl MattermostHandler {
    pub fn new(
        config: MattermostConfig,
        overrides: &HandlerOverrides,
    ) -> Result<Self, ValidationError> {
        let http = HttpClient::new(&overrides.http, config.verify)
            .map_err(|e| ValidationError::invalid("verify", e.to_string()))?;
        Ok(Self {
            config,
            http,
            asset: overrides.asset.clone(),
        })
    }

    pub fn config(&self) -> &MattermostConfig {
        &self.config
    }

    fn payload(&self, message: &PreparedMessage, channel: Option<&str>) -> Value {
        let icon_url = if self.config.include_image {
            self.asset.image_url(message.notify_type, IMAGE_SIZE)
        } else {
            None
        };
        let mut payload = json!({
            "text": message.body,
            "icon_url": icon_url,
            "username": self
                .config
                .botname
                .as_deref()
                .unwrap_or(self.asset.app_id.as_str()),
        });
        if let Some(channel) = channel {
            payload["channel"] = json!(channel);
        }
        payload
    }
}

#[async_trait]
impl NotifyHandler for MattermostHandler {
    fn url(&self) -> ParsedUrl {
        self.config.to_url()
    }

    /// The token is the secret here; it is the last path segment.
    fn url_redacted(&self) -> String {
        let url = self.config.to_url().to_string();
        let token = quote(&self.config.token);
        let path_end = url.find('?').unwrap_or(url.len());
        match url[..path_end].rfind(token.as_ref()) {
            Some(start) => format!(
                "{}{REDACTED}{}",
                &url[..start],
                &url[start + token.len()..]
            ),
            None => url,
        }
    }

    async fn send(&self, message: &PreparedMessage) -> Result<(), NotifyError> {
        let mut first_error = None;
        for index in 0..self.destinations() {
            if let Err(error) = self.send_to(message, index).await {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// One destination per channel, or the webhook's default channel.
    fn destinations(&self) -> usize {
        self.config.channels.len().max(1)
    }

    async fn send_to(&self, message: &PreparedMessage, index: usize) -> Result<(), NotifyError> {
        let channel = self.config.channels.get(index).map(String::as_str);
        let body = serde_json::to_vec(&self.payload(message, channel))
            .map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;
        debug!(channel = ?channel, verify = self.config.verify, "Posting to Mattermost");

        let request = self
            .http
            .client()
            .post(self.config.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Err(error) = self.http.execute(request).await {
            warn!(channel = ?channel, error = %error, "Mattermost channel delivery failed");
            return Err(error);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::NotifyType;
    use crate::url::parse;

    fn config(url: &str) -> Result<MattermostConfig, ValidationError> {
        MattermostConfig::from_url(&parse(url).unwrap())
    }

    #[test]
    fn test_minimal_url() {
        let config = config("mmost://localhost/abc123").unwrap();
        assert!(!config.secure);
        assert_eq!(config.token, "abc123");
        assert!(config.include_image);
        assert!(config.channels.is_empty());
        assert_eq!(config.endpoint(), "http://localhost/hooks/abc123");
    }

    #[test]
    fn test_full_url() {
        let config = config(
            "mmosts://bot@chat.example.com:8443/team/prefix/abc123?channel=%23ops,dev&to=qa&image=no",
        )
        .unwrap();
        assert!(config.secure);
        assert_eq!(config.botname.as_deref(), Some("bot"));
        assert_eq!(config.fullpath, vec!["team", "prefix"]);
        assert_eq!(config.channels, vec!["qa", "ops", "dev"]);
        assert!(!config.include_image);
        assert_eq!(
            config.endpoint(),
            "https://chat.example.com:8443/team/prefix/hooks/abc123"
        );
    }

    #[test]
    fn test_missing_parts() {
        assert_eq!(config("mmost://localhost").unwrap_err(), ValidationError::missing("token"));
        assert_eq!(config("mmost:///abc").unwrap_err(), ValidationError::missing("host"));
    }

    #[test]
    fn test_url_round_trip() {
        for raw in [
            "mmost://localhost/abc123",
            "mmosts://bot@chat.example.com:8443/team/abc123?channel=ops,dev&image=no&verify=no",
        ] {
            let first = config(raw).unwrap();
            let again =
                MattermostConfig::from_url(&parse(&first.to_url().to_string()).unwrap()).unwrap();
            assert_eq!(first, again, "{raw}");
        }
    }

    #[test]
    fn test_native_url_rewrite() {
        assert_eq!(
            rewrite_native_url("https://mattermost.example.com/hooks/abc-123").as_deref(),
            Some("mmosts://mattermost.example.com/abc-123/")
        );
        assert_eq!(
            rewrite_native_url("http://Mattermost.example.com:8065/hooks/tok?channel=ops")
                .as_deref(),
            Some("mmost://Mattermost.example.com:8065/tok/?channel=ops")
        );
        assert!(rewrite_native_url("https://chat.example.com/hooks/abc").is_none());
        assert!(rewrite_native_url("https://mattermost.example.com/other/abc").is_none());
    }

    #[test]
    fn test_redacted_url_masks_token() {
        let handler = MattermostHandler::new(
            config("mmosts://bot@host/secret-token").unwrap(),
            &HandlerOverrides::default(),
        )
        .unwrap();
        let redacted = handler.url_redacted();
        assert!(!redacted.contains("secret-token"));
        assert_eq!(redacted, "mmosts://bot@host/****?image=yes");
    }

    #[test]
    fn test_one_destination_per_channel() {
        let overrides = HandlerOverrides::default();
        let handler = MattermostHandler::new(config("mmost://host/tok").unwrap(), &overrides).unwrap();
        assert_eq!(handler.destinations(), 1);

        let handler =
            MattermostHandler::new(config("mmost://host/tok?channels=a,b,c").unwrap(), &overrides)
                .unwrap();
        assert_eq!(handler.destinations(), 3);
    }

    #[test]
    fn test_payload() {
        let overrides = HandlerOverrides {
            asset: AppAsset {
                app_id: "Notifybox".into(),
                image_url_mask: Some("https://img.example.com/{TYPE}-{XY}.png".into()),
            },
            ..Default::default()
        };
        let handler =
            MattermostHandler::new(config("mmost://host/tok").unwrap(), &overrides).unwrap();
        let message = PreparedMessage {
            title: String::new(),
            body: "# T\r\nB".into(),
            notify_type: NotifyType::Failure,
            format: NotifyFormat::Markdown,
            attachments: Vec::new(),
        };

        let payload = handler.payload(&message, Some("ops"));
        assert_eq!(payload["text"], "# T\r\nB");
        assert_eq!(payload["username"], "Notifybox");
        assert_eq!(payload["channel"], "ops");
        assert_eq!(payload["icon_url"], "https://img.example.com/failure-72x72.png");

        let payload = handler.payload(&message, None);
        assert!(payload.get("channel").is_none());
    }
}
