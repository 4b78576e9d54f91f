use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, info};

use super::instance::HandlerInstance;
use super::traits::ValidationError;
use super::types::{HandlerDescriptor, HandlerOverrides};
use crate::url::{self, ParseError, ParsedUrl};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler not found: {0}")]
    NotFound(String),

    #[error("scheme '{scheme}' of {incoming} is already claimed by {existing}")]
    DuplicateScheme {
        scheme: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("a handler registry is already installed")]
    AlreadyInstalled,
}

/// Why a URL could not become a handler instance
#[derive(Debug, Error)]
pub enum AddError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no handler registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Registry mapping URL schemes to handler descriptors
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    descriptors: Vec<Arc<HandlerDescriptor>>,
    schemes: BTreeMap<String, Arc<HandlerDescriptor>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in plugin
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in crate::plugins::builtin() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a descriptor under all of its schemes.
    ///
    /// Fails without changing the registry if any scheme is taken.
    pub fn register(
        &mut self,
        descriptor: impl Into<Arc<HandlerDescriptor>>,
    ) -> Result<(), RegistryError> {
        let descriptor = descriptor.into();

        for scheme in descriptor.all_schemes() {
            if let Some(existing) = self.schemes.get(&scheme.to_ascii_lowercase()) {
                return Err(RegistryError::DuplicateScheme {
                    scheme: scheme.to_string(),
                    existing: existing.service_name,
                    incoming: descriptor.service_name,
                });
            }
        }

        for scheme in descriptor.all_schemes() {
            self.schemes
                .insert(scheme.to_ascii_lowercase(), descriptor.clone());
        }
        debug!(
            service = descriptor.service_name,
            schemes = ?descriptor.all_schemes().collect::<Vec<_>>(),
            "Registered handler"
        );
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Descriptor claiming `scheme`, ignoring case.
    pub fn lookup(&self, scheme: &str) -> Result<Arc<HandlerDescriptor>, RegistryError> {
        self.schemes
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(scheme.to_string()))
    }

    /// Descriptors in registration order
    pub fn all(&self) -> &[Arc<HandlerDescriptor>] {
        &self.descriptors
    }

    /// Find the descriptor for `raw` and parse it with that descriptor's
    /// options.
    ///
    /// URLs with an unregistered scheme are offered to each descriptor's
    /// native-URL rewriter, so vendor webhook URLs resolve too.
    pub fn resolve(&self, raw: &str) -> Result<(Arc<HandlerDescriptor>, ParsedUrl), AddError> {
        let Some(scheme) = url::scheme_of(raw) else {
            // Report the parser's diagnosis of the broken input
            return Err(match url::parse(raw) {
                Err(e) => AddError::Parse(e),
                Ok(parsed) => AddError::UnknownScheme(parsed.scheme().to_string()),
            });
        };

        if let Ok(descriptor) = self.lookup(&scheme) {
            let parsed = url::parse_with(raw, &descriptor.parse_options)?;
            return Ok((descriptor, parsed));
        }

        for descriptor in &self.descriptors {
            let Some(rewrite) = descriptor.native_url else {
                continue;
            };
            if let Some(rewritten) = rewrite(raw) {
                debug!(
                    service = descriptor.service_name,
                    "Rewrote native webhook URL"
                );
                let parsed = url::parse_with(&rewritten, &descriptor.parse_options)?;
                return Ok((descriptor.clone(), parsed));
            }
        }

        Err(AddError::UnknownScheme(scheme))
    }

    /// Build a handler instance from a raw URL.
    pub fn instantiate(
        &self,
        raw: &str,
        overrides: &HandlerOverrides,
    ) -> Result<HandlerInstance, AddError> {
        let (descriptor, parsed) = self.resolve(raw)?;
        Ok(HandlerInstance::construct(descriptor, &parsed, overrides)?)
    }

    /// Build a handler instance from an already parsed URL.
    pub fn instantiate_parsed(
        &self,
        parsed: &ParsedUrl,
        overrides: &HandlerOverrides,
    ) -> Result<HandlerInstance, AddError> {
        let descriptor = self
            .lookup(parsed.scheme())
            .map_err(|_| AddError::UnknownScheme(parsed.scheme().to_string()))?;
        Ok(HandlerInstance::construct(descriptor, parsed, overrides)?)
    }
}

static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();

/// Make `registry` the process-wide registry. Only the first call succeeds.
pub fn install(registry: HandlerRegistry) -> Result<Arc<HandlerRegistry>, RegistryError> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(registry.clone())
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    info!(
        handlers = registry.all().len(),
        "Installed handler registry"
    );
    Ok(registry)
}

/// Install a registry holding the built-in plugins.
pub fn install_builtins() -> Result<Arc<HandlerRegistry>, RegistryError> {
    install(HandlerRegistry::with_builtins()?)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<HandlerRegistry>> {
    GLOBAL.get().cloned()
}
