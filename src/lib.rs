//! callguard
//!
//! Caller-aware guards for three dangerous operations: terminating the
//! process, spawning an external process, and opening an outbound connection.
//!
//! - **Rewriting**: [`callguard_core`] injects a guard call in front of every
//!   matching call site in compiled method bodies.
//! - **Policy**: [`callguard_policy`] attributes each guarded call to the
//!   module that made it and checks it against configured allow-lists.
//! - **Agent**: [`agent`] wires both halves to a host's class lifecycle.
//!
//! The `callguard` binary exposes the same pieces on the command line.

pub mod agent;

pub use agent::{Agent, AgentError, ClassEvent};
