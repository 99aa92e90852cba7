//! The permission policy engine.
//!
//! # Frame accounting
//!
//! Attribution skips a fixed number of frames that belong to the support code
//! itself. The chain, innermost first, is:
//!
//! | frame | constant |
//! |---|---|
//! | `CallerResolver::resolve_caller` | [`RESOLVER_FRAMES`] |
//! | `check_operation`, plus the public dispatch method | [`ENGINE_FRAMES`] |
//! | `Guard::check_permission`, only when entered through the guard | [`GUARD_FRAMES`] |
//!
//! Adding or removing a layer means changing exactly one of these constants;
//! the depth tests in this module and in `tests/` fail otherwise.

use std::sync::Arc;

use tracing::{debug, info};

use callguard_types::{Operation, Principal};

use crate::catalog::PermissionCatalog;
use crate::config::PolicyConfig;
use crate::errors::Denial;
use crate::guard::GUARD_FRAMES;
use crate::resolver::{CallerResolver, FrameSkip, RESOLVER_FRAMES};
use crate::stack::{Frame, StackWalker, ThreadStack};

/// Frames the engine adds between its public entry and the resolver.
pub const ENGINE_FRAMES: usize = 2;

/// Skip for a direct [`PolicyEngine::check_permission`] call.
pub const DIRECT_SKIP: FrameSkip = FrameSkip::new(RESOLVER_FRAMES + ENGINE_FRAMES);

/// Skip for a check entered through the guard.
pub const GUARDED_SKIP: FrameSkip = FrameSkip::new(RESOLVER_FRAMES + ENGINE_FRAMES + GUARD_FRAMES);

/// Decides whether the current caller may perform an operation.
#[derive(Debug)]
pub struct PolicyEngine<W: StackWalker = ThreadStack> {
    catalog: Arc<PermissionCatalog>,
    resolver: CallerResolver<W>,
}

impl PolicyEngine<ThreadStack> {
    pub fn new(catalog: PermissionCatalog) -> Self {
        Self::with_walker(catalog, ThreadStack)
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(PermissionCatalog::from_config(config))
    }
}

impl<W: StackWalker> PolicyEngine<W> {
    pub fn with_walker(catalog: PermissionCatalog, walker: W) -> Self {
        Self {
            catalog: Arc::new(catalog),
            resolver: CallerResolver::with_walker(walker),
        }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn walker(&self) -> &W {
        self.resolver.walker()
    }

    /// Check `operation` for the code calling this method.
    pub fn check_permission(&self, operation: Operation) -> Result<(), Denial> {
        let _frame = self
            .walker()
            .enter(Frame::support("callguard.bootstrap.PolicyEngine.check_permission"));
        self.check_operation(operation, DIRECT_SKIP)
    }

    /// Entry used by the guard, which adds its own frame to the chain.
    pub(crate) fn check_guarded(&self, operation: Operation) -> Result<(), Denial> {
        let _frame = self
            .walker()
            .enter(Frame::support("callguard.bootstrap.PolicyEngine.check_guarded"));
        self.check_operation(operation, GUARDED_SKIP)
    }

    fn check_operation(&self, operation: Operation, skip: FrameSkip) -> Result<(), Denial> {
        let _frame = self
            .walker()
            .enter(Frame::support("callguard.bootstrap.PolicyEngine.check_operation"));
        let caller = self.resolver.resolve_caller(skip);
        debug!(
            operation = %operation,
            caller = caller.as_ref().map(Principal::name).unwrap_or("<unknown>"),
            "attributed guarded call"
        );
        match caller {
            Some(principal) if self.catalog.allows(operation, &principal) => Ok(()),
            principal => {
                let denial = Denial {
                    operation,
                    principal,
                };
                info!(%denial, "guarded operation denied");
                Err(denial)
            }
        }
    }
}
