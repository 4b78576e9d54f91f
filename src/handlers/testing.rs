//! In-process handler used by unit tests
//!
//! `mock://host` accepts:
//! - `fail=<kind>`: every send fails with that error kind
//! - `fail_first=<n>`: the first `n` sends fail with a network error
//! - `fail_call=<n>`: only the `n`th send (1-based) fails with a network error
//! - `delay=<ms>`: sleep before answering

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::traits::{ErrorKind, NotifyError, NotifyHandler, ValidationError};
use super::types::{Capabilities, HandlerDescriptor, HandlerOverrides, PreparedMessage};
use crate::url::{ParseOptions, ParsedUrl, UrlBuilder};

/// Shared log of everything a mock handler was asked to send
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    sent: Arc<Mutex<Vec<(Instant, PreparedMessage)>>>,
    attempts: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.body.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<PreparedMessage> {
        self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Sends attempted, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockHandler {
    scheme: String,
    host: String,
    path: Vec<String>,
    fail: Option<ErrorKind>,
    fail_first: usize,
    fail_call: Option<usize>,
    delay: Option<Duration>,
    recorder: Recorder,
}

fn error_of(kind: ErrorKind) -> NotifyError {
    let message = "mock failure".to_string();
    match kind {
        ErrorKind::Network => NotifyError::Network(message),
        ErrorKind::Auth => NotifyError::Auth(message),
        ErrorKind::RateLimited => NotifyError::RateLimited(message),
        ErrorKind::InvalidPayload => NotifyError::InvalidPayload(message),
        ErrorKind::Timeout => NotifyError::Timeout(Duration::from_secs(1)),
        ErrorKind::Unknown => NotifyError::Unknown(message),
    }
}

fn parse_kind(value: &str) -> Option<ErrorKind> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
}

impl MockHandler {
    fn construct(url: &ParsedUrl, recorder: Recorder) -> Result<Self, ValidationError> {
        if url.host().is_empty() {
            return Err(ValidationError::missing("host"));
        }
        let query = url.query();
        let fail = match query.get("fail") {
            Some(value) => Some(
                parse_kind(value).ok_or_else(|| ValidationError::invalid("fail", value))?,
            ),
            None => None,
        };
        let fail_first = match query.get("fail_first") {
            Some(value) => value
                .parse()
                .map_err(|_| ValidationError::invalid("fail_first", value))?,
            None => 0,
        };
        let fail_call = match query.get("fail_call") {
            Some(value) => Some(
                value
                    .parse()
                    .map_err(|_| ValidationError::invalid("fail_call", value))?,
            ),
            None => None,
        };
        let delay = match query.get("delay") {
            Some(value) => Some(Duration::from_millis(
                value
                    .parse()
                    .map_err(|_| ValidationError::invalid("delay", value))?,
            )),
            None => None,
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: url.host().to_string(),
            path: url.path().to_vec(),
            fail,
            fail_first,
            fail_call,
            delay,
            recorder,
        })
    }
}

#[async_trait]
impl NotifyHandler for MockHandler {
    fn url(&self) -> ParsedUrl {
        let mut builder = UrlBuilder::new(&self.scheme).host(&self.host);
        for segment in &self.path {
            builder = builder.segment(segment);
        }
        if let Some(kind) = self.fail {
            builder = builder.param("fail", kind.as_str());
        }
        if self.fail_first > 0 {
            builder = builder.param("fail_first", self.fail_first.to_string());
        }
        if let Some(call) = self.fail_call {
            builder = builder.param("fail_call", call.to_string());
        }
        if let Some(delay) = self.delay {
            builder = builder.param("delay", delay.as_millis().to_string());
        }
        builder.build()
    }

    async fn send(&self, message: &PreparedMessage) -> Result<(), NotifyError> {
        let attempt = self.recorder.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.fail {
            return Err(error_of(kind));
        }
        if attempt < self.fail_first || self.fail_call == Some(attempt + 1) {
            return Err(error_of(ErrorKind::Network));
        }
        self.recorder
            .sent
            .lock()
            .unwrap()
            .push((Instant::now(), message.clone()));
        Ok(())
    }
}

fn build_descriptor(
    schemes: &'static [&'static str],
    capabilities: Capabilities,
    recorder: Recorder,
) -> Arc<HandlerDescriptor> {
    Arc::new(HandlerDescriptor {
        service_name: "Mock",
        service_url: None,
        schemes,
        secure_schemes: &[],
        capabilities,
        parse_options: ParseOptions::default(),
        construct: Arc::new(move |url: &ParsedUrl, _: &HandlerOverrides| {
            Ok(Box::new(MockHandler::construct(url, recorder.clone())?) as Box<dyn NotifyHandler>)
        }),
        native_url: None,
    })
}

/// Mock descriptor with default capabilities claiming `schemes`.
pub fn descriptor(schemes: &'static [&'static str]) -> Arc<HandlerDescriptor> {
    build_descriptor(schemes, Capabilities::default(), Recorder::default())
}

/// `mock://` descriptor whose instances all log into the returned recorder.
pub fn recording_descriptor(capabilities: Capabilities) -> (Arc<HandlerDescriptor>, Recorder) {
    let recorder = Recorder::default();
    (
        build_descriptor(&["mock"], capabilities, recorder.clone()),
        recorder,
    )
}
