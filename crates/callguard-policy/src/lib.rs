//! callguard policy
//!
//! Run-time half of callguard: decides, at the moment a guarded operation is
//! about to run, whether the code that asked for it is allowed to.
//!
//! # Core Modules
//!
//! - [`config`]: property sources and validated [`PolicyConfig`]
//! - [`catalog`]: the immutable operation to allow-list table
//! - [`stack`]: the [`StackWalker`] capability and the thread-local [`ThreadStack`]
//! - [`resolver`]: caller attribution over a stack walker
//! - [`engine`]: [`PolicyEngine`], the allow/deny decision
//! - [`guard`]: [`Guard`], the entry point rewritten code calls
//! - [`guarded`]: host operations wrapped in the guard
//! - [`errors`]: error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use callguard_policy::config::{PolicyConfig, Properties};
//! use callguard_policy::stack::{Frame, StackWalker, ThreadStack};
//! use callguard_policy::{Guard, PolicyEngine};
//!
//! let mut props = Properties::new();
//! props.insert("callguard.runtime.exit.allow".into(), "module app.admin".into());
//! let config = PolicyConfig::from_properties(&props).unwrap();
//! let guard = Guard::new(Arc::new(PolicyEngine::from_config(&config)));
//!
//! let _frame = ThreadStack.enter(Frame::module("app.plugin", "app.plugin.Hook.run"));
//! let err = guard.check_permission("Runtime.exit").unwrap_err();
//! assert_eq!(err.to_string(), "Runtime.exit not allowed for Module: app.plugin");
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod guarded;
pub mod resolver;
pub mod stack;

pub use catalog::PermissionCatalog;
pub use config::{PolicyConfig, Properties};
pub use engine::PolicyEngine;
pub use errors::{ConfigError, Denial, GuardError, GuardedError, InternalError};
pub use guard::Guard;
pub use resolver::{CallerResolver, FrameSkip};
pub use stack::{Frame, FrameGuard, StackWalker, ThreadStack};
