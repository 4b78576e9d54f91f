//! Handler system
//!
//! A handler type is described by a [`HandlerDescriptor`]: its schemes, its
//! [`Capabilities`] and a constructor that validates a [`ParsedUrl`] into a
//! [`NotifyHandler`]. The [`HandlerRegistry`] maps schemes to descriptors and
//! [`HandlerInstance`] wraps a constructed handler with the behavior every
//! handler shares: format negotiation, length limits and throttling.
//!
//! ## Key Components
//!
//! - [`NotifyHandler`] - Trait implemented by each vendor plugin
//! - [`HandlerDescriptor`] - Static description of a handler type
//! - [`HandlerRegistry`] - Scheme to descriptor mapping, installed once
//! - [`HandlerInstance`] - One configured endpoint
//! - [`NotifyRequest`] - Message submitted by the caller
//!
//! ## Example
//!
//! ```rust
//! use notifybox::handlers::{HandlerOverrides, HandlerRegistry};
//!
//! let registry = HandlerRegistry::with_builtins().unwrap();
//! let instance = registry
//!     .instantiate("json://localhost:8080/hook", &HandlerOverrides::default())
//!     .unwrap();
//! assert_eq!(instance.service_name(), "JSON");
//! ```
//!
//! [`ParsedUrl`]: crate::url::ParsedUrl

pub mod format;
mod instance;
mod registry;
#[cfg(test)]
pub(crate) mod testing;
mod traits;
mod types;

pub use format::{NotifyFormat, OverflowMode};
pub use instance::{DeliveryProgress, HandlerId, HandlerInstance, InstanceOptions};
pub use registry::{AddError, HandlerRegistry, RegistryError, global, install, install_builtins};
pub use traits::{ErrorKind, NotifyError, NotifyHandler, ValidationError};
pub use types::{
    AppAsset, Capabilities, Constructor, HandlerDescriptor, HandlerOverrides, NativeUrlRewriter,
    NotifyRequest, NotifyType, PreparedMessage, parse_bool, parse_list,
};
