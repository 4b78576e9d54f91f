use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::outcome::{DispatchReport, NotifyOutcome, SkipReason};
use super::retry::RetryPolicy;
use super::set::DispatchSet;
use super::tags::TagExpression;
use crate::handlers::{DeliveryProgress, HandlerId, HandlerInstance, NotifyError, NotifyRequest};
use crate::observability::Metrics;

/// How many handlers deliver at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Sequential,
    Bounded(usize),
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::Bounded(4)
    }
}

impl Concurrency {
    fn permits(self, selected: usize) -> usize {
        match self {
            Concurrency::Sequential => 1,
            Concurrency::Bounded(cap) => selected.min(cap).max(1),
        }
    }
}

/// What to do when a handler's throttle interval has not elapsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleMode {
    #[default]
    Wait,
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOptions {
    pub concurrency: Concurrency,
    /// Deadline for one delivery attempt
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub throttle_mode: ThrottleMode,
    /// Select and prepare, but do not send
    pub dry_run: bool,
    pub max_attachment_bytes: Option<u64>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::default(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            throttle_mode: ThrottleMode::default(),
            dry_run: false,
            max_attachment_bytes: None,
        }
    }
}

/// Runs one request across a dispatch set
#[derive(Debug, Clone, Default)]
pub struct DispatchExecutor {
    options: DispatchOptions,
    metrics: Arc<Metrics>,
}

enum Slot {
    Done(NotifyOutcome),
    Running(Arc<HandlerInstance>, JoinHandle<NotifyOutcome>),
}

impl DispatchExecutor {
    pub fn new(options: DispatchOptions) -> Self {
        Self {
            options,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Share counters with other executors or the caller.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Deliver `request` to every handler of `set` that `tags` selects.
    ///
    /// The report has one outcome per handler of the set, in set order.
    /// Failures of one handler never affect the others.
    pub async fn notify_all(
        &self,
        set: &DispatchSet,
        request: &NotifyRequest,
        tags: &TagExpression,
    ) -> DispatchReport {
        let instances: Vec<Arc<HandlerInstance>> = set.iter().cloned().collect();
        let selected: HashSet<HandlerId> = set.select(tags).iter().map(|i| i.id()).collect();

        info!(
            handlers = instances.len(),
            selected = selected.len(),
            tags = %tags,
            dry_run = self.options.dry_run,
            "Dispatching notification"
        );

        let semaphore = Arc::new(Semaphore::new(
            self.options.concurrency.permits(selected.len()),
        ));
        let request = Arc::new(request.clone());
        let mut slots = Vec::with_capacity(instances.len());

        for instance in instances {
            let skip = if !instance.is_enabled() {
                Some(SkipReason::Disabled)
            } else if !selected.contains(&instance.id()) {
                Some(SkipReason::TagMismatch)
            } else if self.options.dry_run {
                Some(SkipReason::DryRun)
            } else {
                None
            };

            if let Some(reason) = skip {
                if reason == SkipReason::DryRun {
                    self.dry_run(&instance, &request);
                }
                self.metrics.skipped();
                slots.push(Slot::Done(NotifyOutcome::skipped(&instance, reason)));
                continue;
            }

            let handle = tokio::spawn(deliver(
                instance.clone(),
                request.clone(),
                self.options.clone(),
                self.metrics.clone(),
                semaphore.clone(),
            ));

            if self.options.concurrency == Concurrency::Sequential {
                let outcome = join(&instance, handle).await;
                slots.push(Slot::Done(outcome));
            } else {
                slots.push(Slot::Running(instance, handle));
            }
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            outcomes.push(match slot {
                Slot::Done(outcome) => outcome,
                Slot::Running(instance, handle) => join(&instance, handle).await,
            });
        }

        let report = DispatchReport::new(outcomes);
        info!(summary = %report.summary(), "Dispatch finished");
        report
    }

    fn dry_run(&self, instance: &HandlerInstance, request: &NotifyRequest) {
        match instance.prepare(request, self.options.max_attachment_bytes) {
            Ok(messages) => info!(
                target_url = %instance.url_redacted(),
                messages = messages.len(),
                "Dry run: would deliver"
            ),
            Err(error) => warn!(
                target_url = %instance.url_redacted(),
                error = %error,
                "Dry run: message would be rejected"
            ),
        }
    }
}

async fn join(instance: &HandlerInstance, handle: JoinHandle<NotifyOutcome>) -> NotifyOutcome {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(target_url = %instance.url_redacted(), error = %e, "Handler task aborted");
            NotifyOutcome::failed(
                instance,
                &NotifyError::Unknown(format!("handler task failed: {e}")),
                1,
            )
        }
    }
}

/// Deliver to one handler: throttle, send under a deadline, retry.
async fn deliver(
    instance: Arc<HandlerInstance>,
    request: Arc<NotifyRequest>,
    options: DispatchOptions,
    metrics: Arc<Metrics>,
    semaphore: Arc<Semaphore>,
) -> NotifyOutcome {
    // A closed semaphore only lifts the bound
    let _slot = semaphore.acquire_owned().await.ok();
    let target = instance.url_redacted();

    let messages = match instance.prepare(&request, options.max_attachment_bytes) {
        Ok(messages) => messages,
        Err(error) => {
            warn!(target_url = %target, error = %error, "Message rejected before sending");
            metrics.failed();
            return NotifyOutcome::failed(&instance, &error, 0);
        }
    };

    let mut progress = DeliveryProgress::default();
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let permit = match options.throttle_mode {
            // Retries always wait; skipping applies to the first attempt
            ThrottleMode::Skip if attempt == 1 => match instance.throttle().try_acquire() {
                Some(permit) => permit,
                None => {
                    debug!(target_url = %target, "Throttle interval not elapsed, skipping");
                    metrics.skipped();
                    return NotifyOutcome::skipped(&instance, SkipReason::Throttled);
                }
            },
            _ => instance.throttle().acquire().await,
        };

        let sending = instance.send_prepared(&messages, &mut progress);
        let result = match tokio::time::timeout(options.timeout, sending).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(options.timeout)),
        };
        drop(permit);

        match result {
            Ok(()) => {
                info!(
                    service = instance.service_name(),
                    target_url = %target,
                    attempts = attempt,
                    "Notification delivered"
                );
                metrics.sent();
                return NotifyOutcome::delivered(&instance, attempt, messages.len());
            }
            Err(error) if options.retry.should_retry(error.kind(), attempt) => {
                let delay = options.retry.backoff(attempt);
                warn!(
                    target_url = %target,
                    attempt,
                    error = %error,
                    delivered = progress.delivered(),
                    delay_ms = delay.as_millis() as u64,
                    "Delivery failed, retrying"
                );
                metrics.retried();
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                warn!(
                    service = instance.service_name(),
                    target_url = %target,
                    attempts = attempt,
                    error = %error,
                    "Notification failed"
                );
                metrics.failed();
                return NotifyOutcome::failed(&instance, &error, attempt);
            }
        }
    }
}
