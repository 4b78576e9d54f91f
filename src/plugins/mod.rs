//! Built-in handler plugins
//!
//! Each plugin exposes a `descriptor()`; [`builtin`] is the manifest the
//! default registry is built from.

pub mod json;
pub mod mattermost;

use crate::handlers::HandlerDescriptor;

/// Descriptors of every plugin shipped with the crate
pub fn builtin() -> Vec<HandlerDescriptor> {
    vec![json::descriptor(), mattermost::descriptor()]
}
