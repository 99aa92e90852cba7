//! The guard entry that rewritten code calls.
//!
//! Rewritten method bodies push an operation key and call the guard entry.
//! This is the only place a string becomes an [`Operation`]; a key that maps
//! to nothing means the rewriter and this crate disagree, which is reported as
//! an [`InternalError`] rather than a denial.

use std::sync::Arc;

use tracing::error;

use callguard_types::well_known::guard;
use callguard_types::Operation;

use crate::engine::PolicyEngine;
use crate::errors::{GuardError, InternalError};
use crate::stack::{Frame, StackWalker, ThreadStack};

/// Frames the guard entry adds on top of the engine's chain.
pub const GUARD_FRAMES: usize = 1;

/// Handle bound to the guard entry point.
#[derive(Debug)]
pub struct Guard<W: StackWalker = ThreadStack> {
    engine: Arc<PolicyEngine<W>>,
}

impl<W: StackWalker> Clone for Guard<W> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<W: StackWalker> Guard<W> {
    pub fn new(engine: Arc<PolicyEngine<W>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &PolicyEngine<W> {
        &self.engine
    }

    /// Check the operation named by `key` for the code that reached the guard.
    pub fn check_permission(&self, key: &str) -> Result<(), GuardError> {
        let _frame = self.engine.walker().enter(Frame::support(format!(
            "{}.{}",
            guard::OWNER.replace('/', "."),
            guard::METHOD
        )));
        let operation = Operation::from_key(key).ok_or_else(|| {
            error!(key, "guard called with unknown operation key");
            InternalError::UnknownOperation {
                key: key.to_string(),
            }
        })?;
        self.engine.check_guarded(operation)?;
        Ok(())
    }
}
