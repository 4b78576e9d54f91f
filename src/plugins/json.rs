//! Generic JSON webhook
//!
//! `json://[user[:password]@]host[:port][/path]` (`jsons://` for TLS).
//!
//! Arguments: `method=` (default POST), `user=`/`pass=` credential
//! overrides, `verify=no`, and three families of extras:
//! - `+Header=value` adds an HTTP header
//! - `-param=value` adds a query parameter to the request
//! - `:field=value` adds a payload field, or renames a built-in one
//!   (`:message=text`); an empty value removes the built-in field

use std::fmt;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::attachment::Attachment;
use crate::handlers::{
    Capabilities, HandlerDescriptor, HandlerOverrides, NotifyError, NotifyFormat, NotifyHandler,
    PreparedMessage, ValidationError, parse_bool,
};
use crate::http::HttpClient;
use crate::url::{ParseOptions, ParsedUrl, UrlBuilder, quote};

const SCHEME: &str = "json";
const SECURE_SCHEME: &str = "jsons";
const PAYLOAD_VERSION: &str = "1.0";

/// Accepted `method=` values
pub const METHODS: &[&str] = &["POST", "GET", "DELETE", "PUT", "HEAD", "PATCH"];

/// Built-in payload fields, in payload order
const FIELDS: &[&str] = &["version", "title", "message", "attachments", "type"];

pub fn descriptor() -> HandlerDescriptor {
    HandlerDescriptor {
        service_name: "JSON",
        service_url: None,
        schemes: &[SCHEME],
        secure_schemes: &[SECURE_SCHEME],
        capabilities: Capabilities {
            max_body_length: 32768,
            title_maxlen: 250,
            body_formats: NotifyFormat::ALL,
            native_format: NotifyFormat::Text,
            attachment_support: true,
            ..Default::default()
        },
        parse_options: ParseOptions::default(),
        construct: std::sync::Arc::new(construct),
        native_url: None,
    }
}

fn construct(
    url: &ParsedUrl,
    overrides: &HandlerOverrides,
) -> Result<Box<dyn NotifyHandler>, ValidationError> {
    Ok(Box::new(JsonHandler::new(JsonConfig::from_url(url)?, overrides)?))
}

/// Validated `json://` configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonConfig {
    pub secure: bool,
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub path: Vec<String>,
    pub trailing_slash: bool,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub payload_extras: Vec<(String, String)>,
    pub verify: bool,
}

impl JsonConfig {
    pub fn from_url(url: &ParsedUrl) -> Result<Self, ValidationError> {
        if url.host().is_empty() {
            return Err(ValidationError::missing("host"));
        }
        let query = url.query();

        let method = match query.get_ignore_case("method") {
            Some(value) => {
                let upper = value.trim().to_ascii_uppercase();
                if !METHODS.contains(&upper.as_str()) {
                    return Err(ValidationError::invalid(
                        "method",
                        format!("'{value}' is not supported"),
                    ));
                }
                Method::from_bytes(upper.as_bytes())
                    .map_err(|e| ValidationError::invalid("method", e.to_string()))?
            }
            None => Method::POST,
        };

        let headers: Vec<(String, String)> = query
            .prefixed('+')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (name, value) in &headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ValidationError::invalid(format!("+{name}"), e.to_string()))?;
            HeaderValue::from_str(value)
                .map_err(|e| ValidationError::invalid(format!("+{name}"), e.to_string()))?;
        }

        let user = query
            .first_of(&["user"])
            .map(str::to_string)
            .or_else(|| url.user().map(str::to_string));
        let password = query
            .first_of(&["pass", "password"])
            .map(str::to_string)
            .or_else(|| url.password().map(str::to_string));

        Ok(Self {
            secure: url.scheme() == SECURE_SCHEME,
            host: url.host().to_string(),
            port: url.port(),
            user,
            password,
            path: url.path().to_vec(),
            trailing_slash: url.has_trailing_slash(),
            method,
            headers,
            params: query
                .prefixed('-')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            payload_extras: query
                .prefixed(':')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            verify: parse_bool(query.get_ignore_case("verify"), true),
        })
    }

    pub fn to_url(&self) -> ParsedUrl {
        let mut builder = UrlBuilder::new(if self.secure { SECURE_SCHEME } else { SCHEME })
            .host(&self.host)
            .port(self.port)
            .trailing_slash(self.trailing_slash);
        if let Some(user) = &self.user {
            builder = builder.user(user);
        }
        if let Some(password) = &self.password {
            builder = builder.password(password);
        }
        for segment in &self.path {
            builder = builder.segment(segment);
        }

        builder = builder.param("method", self.method.as_str());
        if !self.verify {
            builder = builder.param("verify", "no");
        }
        for (k, v) in &self.headers {
            builder = builder.param(format!("+{k}"), v);
        }
        for (k, v) in &self.params {
            builder = builder.param(format!("-{k}"), v);
        }
        for (k, v) in &self.payload_extras {
            builder = builder.param(format!(":{k}"), v);
        }
        builder.build()
    }

    /// Address the request is sent to
    pub fn endpoint(&self) -> String {
        let mut endpoint = format!(
            "{}://{}",
            if self.secure { "https" } else { "http" },
            self.host
        );
        if let Some(port) = self.port {
            endpoint.push_str(&format!(":{port}"));
        }
        for segment in &self.path {
            endpoint.push('/');
            endpoint.push_str(&quote(segment));
        }
        if self.trailing_slash || self.path.is_empty() {
            endpoint.push('/');
        }
        endpoint
    }

    /// Payload for one message with extras applied.
    fn payload(&self, message: &PreparedMessage, attachments: Vec<Value>) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("version".into(), json!(PAYLOAD_VERSION));
        payload.insert("title".into(), json!(message.title));
        payload.insert("message".into(), json!(message.body));
        payload.insert("attachments".into(), Value::Array(attachments));
        payload.insert("type".into(), json!(message.notify_type.as_str()));

        for (key, value) in &self.payload_extras {
            if FIELDS.contains(&key.as_str()) {
                if let Some(builtin) = payload.remove(key) {
                    if !value.is_empty() {
                        payload.insert(value.clone(), builtin);
                    }
                }
            } else {
                payload.insert(key.clone(), json!(value));
            }
        }
        payload
    }
}

pub struct JsonHandler {
    config: JsonConfig,
    http: HttpClient,
}

impl fmt::Debug for JsonHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonHandler")
            .field("target", &self.config.to_url().redacted())
            .finish()
    }
}

impl JsonHandler {
    pub fn new(config: JsonConfig, overrides: &HandlerOverrides) -> Result<Self, ValidationError> {
        let http = HttpClient::new(&overrides.http, config.verify)
            .map_err(|e| ValidationError::invalid("verify", e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &JsonConfig {
        &self.config
    }
}

async fn encode_attachments(
    attachments: &[std::sync::Arc<dyn Attachment>],
) -> Result<Vec<Value>, NotifyError> {
    let mut encoded = Vec::with_capacity(attachments.len());
    for (no, attachment) in attachments.iter().enumerate() {
        let base64 = attachment
            .base64()
            .await
            .map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;
        let filename = if attachment.name().is_empty() {
            format!("file{:03}.dat", no + 1)
        } else {
            attachment.name().to_string()
        };
        encoded.push(json!({
            "filename": filename,
            "base64": base64,
            "mimetype": attachment.mimetype().as_ref(),
        }));
    }
    Ok(encoded)
}

#[async_trait]
impl NotifyHandler for JsonHandler {
    fn url(&self) -> ParsedUrl {
        self.config.to_url()
    }

    async fn send(&self, message: &PreparedMessage) -> Result<(), NotifyError> {
        let attachments = encode_attachments(&message.attachments).await?;
        let payload = self.config.payload(message, attachments);
        let body = serde_json::to_vec(&payload)
            .map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;

        let endpoint = self.config.endpoint();
        debug!(
            method = %self.config.method,
            endpoint = %endpoint,
            verify = self.config.verify,
            "Sending JSON notification"
        );

        let mut request = self
            .http
            .client()
            .request(self.config.method.clone(), &endpoint)
            .query(&self.config.params)
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_ref());
        }

        self.http.execute(request.body(body)).await?;
        Ok(())
    }
}
