use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::executor::DispatchExecutor;
use super::outcome::DispatchReport;
use super::tags::TagExpression;
use crate::config::text;
use crate::handlers::{
    AddError, HandlerId, HandlerInstance, HandlerOverrides, HandlerRegistry, NotifyRequest,
};
use crate::url::ParsedUrl;

/// One rejected entry of a bulk add
#[derive(Debug, Error)]
#[error("entry {position}: {error}")]
pub struct BatchError {
    /// Index for [`DispatchSet::extend`], line number for
    /// [`DispatchSet::load_text`]
    pub position: usize,
    #[source]
    pub error: AddError,
}

/// Result of a bulk add; successes stay in the set even when some entries
/// fail.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub added: Vec<Arc<HandlerInstance>>,
    pub errors: Vec<BatchError>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Ordered collection of handler instances
///
/// Mutation needs `&mut self`, so the set cannot change while a dispatch
/// borrows it:
///
/// ```rust,compile_fail
/// use std::sync::Arc;
/// use notifybox::dispatch::{DispatchSet, TagExpression};
/// use notifybox::handlers::{HandlerRegistry, NotifyRequest};
///
/// let mut set = DispatchSet::new(Arc::new(HandlerRegistry::with_builtins().unwrap()));
/// let request = NotifyRequest::builder().body("hi").build();
/// let tags = TagExpression::any();
///
/// let pending = set.notify(&request, &tags);
/// set.clear();
/// drop(pending);
/// ```
#[derive(Debug)]
pub struct DispatchSet {
    registry: Arc<HandlerRegistry>,
    overrides: HandlerOverrides,
    instances: Vec<Arc<HandlerInstance>>,
    executor: DispatchExecutor,
}

impl DispatchSet {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            overrides: HandlerOverrides::default(),
            instances: Vec::new(),
            executor: DispatchExecutor::default(),
        }
    }

    /// Settings applied to handlers added from now on.
    pub fn with_overrides(mut self, overrides: HandlerOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_executor(mut self, executor: DispatchExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &DispatchExecutor {
        &self.executor
    }

    /// Parse, resolve and validate `raw`, then append it with `tags`.
    pub fn add<I, S>(&mut self, raw: &str, tags: I) -> Result<Arc<HandlerInstance>, AddError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let instance = self.registry.instantiate(raw, &self.overrides)?;
        Ok(self.push(instance.with_tags(tags)))
    }

    /// Like [`add`](Self::add) for an already parsed URL.
    pub fn add_parsed<I, S>(
        &mut self,
        parsed: &ParsedUrl,
        tags: I,
    ) -> Result<Arc<HandlerInstance>, AddError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let instance = self.registry.instantiate_parsed(parsed, &self.overrides)?;
        Ok(self.push(instance.with_tags(tags)))
    }

    fn push(&mut self, instance: HandlerInstance) -> Arc<HandlerInstance> {
        let instance = Arc::new(instance);
        debug!(
            id = %instance.id(),
            service = instance.service_name(),
            target = %instance.url_redacted(),
            tags = ?instance.tags(),
            "Added handler"
        );
        self.instances.push(instance.clone());
        instance
    }

    /// Add untagged URLs; each failure is reported with its index.
    pub fn extend<I, S>(&mut self, urls: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = BatchReport::default();
        for (position, raw) in urls.into_iter().enumerate() {
            match self.add(raw.as_ref(), Vec::<String>::new()) {
                Ok(instance) => report.added.push(instance),
                Err(error) => {
                    warn!(position, error = %error, "Skipping invalid URL");
                    report.errors.push(BatchError { position, error });
                }
            }
        }
        report
    }

    /// Add every entry of a text configuration; failures carry their line
    /// number.
    pub fn load_text(&mut self, content: &str) -> BatchReport {
        let mut report = BatchReport::default();
        for entry in text::parse_text(content) {
            match self.add(&entry.url, entry.tags) {
                Ok(instance) => report.added.push(instance),
                Err(error) => {
                    warn!(line = entry.line, error = %error, "Skipping invalid configuration line");
                    report.errors.push(BatchError {
                        position: entry.line,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Enabled handlers matching `tags`, in set order.
    pub fn select(&self, tags: &TagExpression) -> Vec<Arc<HandlerInstance>> {
        self.instances
            .iter()
            .filter(|instance| instance.is_enabled() && tags.matches(instance.tags()))
            .cloned()
            .collect()
    }

    pub fn remove(&mut self, id: HandlerId) -> Option<Arc<HandlerInstance>> {
        let index = self.instances.iter().position(|i| i.id() == id)?;
        Some(self.instances.remove(index))
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<HandlerInstance>> {
        self.instances.iter()
    }

    pub fn get(&self, id: HandlerId) -> Option<&Arc<HandlerInstance>> {
        self.instances.iter().find(|i| i.id() == id)
    }

    /// Enable or disable a handler; false if `id` is not in the set.
    pub fn set_enabled(&mut self, id: HandlerId, enabled: bool) -> bool {
        match self.get(id) {
            Some(instance) => {
                instance.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Dispatch with this set's executor.
    pub async fn notify(&self, request: &NotifyRequest, tags: &TagExpression) -> DispatchReport {
        self.executor.notify_all(self, request, tags).await
    }
}

impl<'a> IntoIterator for &'a DispatchSet {
    type Item = &'a Arc<HandlerInstance>;
    type IntoIter = std::slice::Iter<'a, Arc<HandlerInstance>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
