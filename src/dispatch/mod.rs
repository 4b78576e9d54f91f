//! Dispatching one message to many handlers
//!
//! A [`DispatchSet`] holds the configured handlers. Each notification is run
//! by a [`DispatchExecutor`], which selects handlers with a
//! [`TagExpression`], delivers with bounded concurrency, applies throttling,
//! retries and timeouts per handler, and collects a [`DispatchReport`] in set
//! order.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notifybox::dispatch::DispatchSet;
//! use notifybox::handlers::{HandlerRegistry, NotifyRequest};
//!
//! # async fn run() {
//! let registry = Arc::new(HandlerRegistry::with_builtins().unwrap());
//! let mut set = DispatchSet::new(registry);
//! set.add("json://localhost:8080/hook", ["ops"]).unwrap();
//!
//! let request = NotifyRequest::builder().title("deploy").body("done").build();
//! let report = set.notify(&request, &"ops".parse().unwrap()).await;
//! println!("{report}");
//! # }
//! ```

mod executor;
pub mod outcome;
mod retry;
mod set;
mod tags;
pub mod throttle;

pub use executor::{Concurrency, DispatchExecutor, DispatchOptions, ThrottleMode};
pub use outcome::{DispatchReport, NotifyOutcome, SkipReason};
pub use retry::RetryPolicy;
pub use set::{BatchError, BatchReport, DispatchSet};
pub use tags::{TAG_ALL, TAG_ALWAYS, TAG_UNTAGGED, TagExpression};
pub use throttle::{Throttle, ThrottlePermit};
