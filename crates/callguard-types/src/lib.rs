//! Shared types for the callguard workspace.
//!
//! This crate holds the vocabulary that both halves of callguard agree on:
//! the rewriter (`callguard-core`) injects guard calls that name an
//! [`Operation`] by its key, and the policy engine (`callguard-policy`)
//! resolves that key back to the same [`Operation`]. Keeping both sides on one
//! definition is what stops the injected literal and the policy table from
//! drifting apart.
//!
//! ## Modules
//!
//! - [`operation`]: the closed catalog of guarded operations and their call-site signatures
//! - [`principal`]: principal identities and the `module <name>` value syntax
//! - [`well_known`]: configuration keys, guard entry coordinates, trusted module names

pub mod operation;
pub mod principal;
pub mod well_known;

pub use operation::{InvokeKind, Operation, OperationSignature};
pub use principal::{Principal, PrincipalParseError};
