use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::format::{self, NotifyFormat, OverflowMode};
use super::traits::{NotifyError, NotifyHandler, ValidationError};
use super::types::{HandlerDescriptor, HandlerOverrides, NotifyRequest, PreparedMessage, parse_list};
use crate::dispatch::outcome::NotifyOutcome;
use crate::dispatch::throttle::Throttle;
use crate::url::{ParsedUrl, UrlBuilder};

/// URL arguments interpreted by the core rather than the handler
pub const ARG_FORMAT: &str = "format";
pub const ARG_OVERFLOW: &str = "overflow";
pub const ARG_TAG: &str = "tag";

/// Unique identity of one handler instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Options taken from the common URL arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Format forced by `format=`; negotiated per message when unset
    pub format: Option<NotifyFormat>,
    pub overflow: OverflowMode,
}

/// How far a batch of prepared messages got across attempts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryProgress {
    delivered: usize,
    /// Destinations of the current message still to deliver; `None` until
    /// it is first tried
    pending: Option<Vec<usize>>,
}

impl DeliveryProgress {
    /// Messages delivered to every destination
    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

/// One configured, validated endpoint
pub struct HandlerInstance {
    id: HandlerId,
    descriptor: Arc<HandlerDescriptor>,
    handler: Box<dyn NotifyHandler>,
    options: InstanceOptions,
    tags: BTreeSet<String>,
    enabled: AtomicBool,
    throttle: Throttle,
}

impl fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstance")
            .field("id", &self.id)
            .field("service", &self.descriptor.service_name)
            .field("target", &self.url_redacted())
            .field("options", &self.options)
            .field("tags", &self.tags)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl HandlerInstance {
    /// Validate `parsed` against `descriptor` and build the handler.
    pub fn construct(
        descriptor: Arc<HandlerDescriptor>,
        parsed: &ParsedUrl,
        overrides: &HandlerOverrides,
    ) -> Result<Self, ValidationError> {
        let query = parsed.query();

        // An explicit `format=` must be supported; the settings-wide
        // override degrades to the closest format the handler accepts.
        let format = match query.get_ignore_case(ARG_FORMAT) {
            Some(value) => {
                let format = value
                    .parse::<NotifyFormat>()
                    .map_err(|e| ValidationError::invalid(ARG_FORMAT, e.to_string()))?;
                if !descriptor.supports_format(format) {
                    return Err(ValidationError::Unsupported(format!(
                        "{} does not accept {format} bodies",
                        descriptor.service_name
                    )));
                }
                Some(format)
            }
            None => overrides.format.map(|requested| {
                let caps = &descriptor.capabilities;
                format::negotiate(requested, caps.body_formats, caps.native_format)
            }),
        };

        let overflow = match query.get_ignore_case(ARG_OVERFLOW) {
            Some(value) => value
                .parse::<OverflowMode>()
                .map_err(|e| ValidationError::invalid(ARG_OVERFLOW, e.to_string()))?,
            None => OverflowMode::default(),
        };

        let handler = (descriptor.construct)(parsed, overrides)?;
        let tags = parse_list(query.get_all(ARG_TAG)).into_iter().collect();

        let instance = Self {
            id: HandlerId::new(),
            throttle: Throttle::new(descriptor.capabilities.throttle_interval),
            descriptor,
            handler,
            options: InstanceOptions { format, overflow },
            tags,
            enabled: AtomicBool::new(true),
        };

        debug!(
            id = %instance.id,
            service = instance.descriptor.service_name,
            target = %instance.url_redacted(),
            "Handler constructed"
        );
        Ok(instance)
    }

    /// Add tags on top of those given by the URL's `tag=` argument.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(
            tags.into_iter()
                .map(Into::into)
                .map(|tag: String| tag.trim().to_string())
                .filter(|tag| !tag.is_empty()),
        );
        self
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    pub fn service_name(&self) -> &'static str {
        self.descriptor.service_name
    }

    pub fn options(&self) -> InstanceOptions {
        self.options
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Canonical URL including the common arguments that differ from their
    /// defaults.
    pub fn url(&self) -> String {
        let mut builder = UrlBuilder::from(self.handler.url());
        if let Some(format) = self.options.format {
            builder = builder.param(ARG_FORMAT, format.as_str());
        }
        if self.options.overflow != OverflowMode::default() {
            builder = builder.param(ARG_OVERFLOW, self.options.overflow.as_str());
        }
        builder.build().to_string()
    }

    /// URL with secrets masked, for logs and reports.
    pub fn url_redacted(&self) -> String {
        self.handler.url_redacted()
    }

    /// Turn a request into the message(s) this handler will receive.
    ///
    /// Negotiates the format, converts markup, applies the title and body
    /// limits and filters attachments. Fails with
    /// [`NotifyError::InvalidPayload`] when an attachment exceeds
    /// `max_attachment_bytes`.
    pub fn prepare(
        &self,
        request: &NotifyRequest,
        max_attachment_bytes: Option<u64>,
    ) -> Result<Vec<PreparedMessage>, NotifyError> {
        let caps = &self.descriptor.capabilities;
        let target = self.options.format.unwrap_or_else(|| {
            format::negotiate(request.format, caps.body_formats, caps.native_format)
        });

        let body = format::convert(&request.body, request.format, target);
        let title = format::convert(&request.title, request.format, target);

        let (title, body) = if caps.title_maxlen == 0 {
            (String::new(), format::fold_title(&title, &body, target))
        } else {
            (
                format::clip(&title, caps.title_maxlen).to_string(),
                body.into_owned(),
            )
        };

        let bodies = match self.options.overflow {
            OverflowMode::Upstream => vec![body],
            OverflowMode::Truncate => {
                vec![format::truncate(&body, caps.max_body_length).into_owned()]
            }
            OverflowMode::Split => format::split_chunks(&body, caps.max_body_length),
        };

        let attachments = if request.attachments.is_empty() {
            Vec::new()
        } else if !caps.attachment_support {
            warn!(
                service = self.service_name(),
                count = request.attachments.len(),
                "Handler does not support attachments, dropping them"
            );
            Vec::new()
        } else {
            if let Some(limit) = max_attachment_bytes {
                for attachment in &request.attachments {
                    if let Some(size) = attachment.size_hint() {
                        if size > limit {
                            return Err(NotifyError::InvalidPayload(format!(
                                "attachment '{}' is {size} bytes, limit is {limit}",
                                attachment.name()
                            )));
                        }
                    }
                }
            }
            request.attachments.clone()
        };

        let messages = bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| PreparedMessage {
                // title and attachments travel with the first chunk only
                title: if i == 0 { title.clone() } else { String::new() },
                body,
                notify_type: request.notify_type,
                format: target,
                attachments: if i == 0 { attachments.clone() } else { Vec::new() },
            })
            .collect();

        Ok(messages)
    }

    /// Send prepared messages in order, resuming from `progress`.
    ///
    /// Every destination of a message is tried before failing with the
    /// first error. `progress` then points at the failed message and its
    /// failed destinations, so calling again with the same `progress` sends
    /// nothing twice. It stays consistent when the future is dropped
    /// between sends.
    pub async fn send_prepared(
        &self,
        messages: &[PreparedMessage],
        progress: &mut DeliveryProgress,
    ) -> Result<(), NotifyError> {
        let destinations = self.handler.destinations().max(1);

        while let Some(message) = messages.get(progress.delivered) {
            let pending = progress
                .pending
                .get_or_insert_with(|| (0..destinations).collect());

            let mut first_error = None;
            let mut index = 0;
            while let Some(&destination) = pending.get(index) {
                match self.handler.send_to(message, destination).await {
                    Ok(()) => {
                        pending.remove(index);
                    }
                    Err(error) => {
                        if destinations > 1 {
                            debug!(
                                target_url = %self.url_redacted(),
                                destination,
                                error = %error,
                                "Destination failed"
                            );
                        }
                        first_error.get_or_insert(error);
                        index += 1;
                    }
                }
            }

            if let Some(error) = first_error {
                return Err(error);
            }
            progress.pending = None;
            progress.delivered += 1;
        }
        Ok(())
    }

    /// Deliver `request` once, waiting for the throttle interval.
    ///
    /// Failures are returned as data in the outcome. Retries and timeouts
    /// are the executor's job.
    pub async fn notify(&self, request: &NotifyRequest) -> NotifyOutcome {
        let messages = match self.prepare(request, None) {
            Ok(messages) => messages,
            Err(error) => return NotifyOutcome::failed(self, &error, 0),
        };

        let _permit = self.throttle.acquire().await;
        match self.send_prepared(&messages, &mut DeliveryProgress::default()).await {
            Ok(()) => NotifyOutcome::delivered(self, 1, messages.len()),
            Err(error) => NotifyOutcome::failed(self, &error, 1),
        }
    }
}
