//! Caller attribution.
//!
//! The caller of a guarded operation is the first frame, outside the support
//! code's own fixed call chain, that does not belong to a trusted module.
//! The chain length is not discovered at run time: every layer between the
//! guard entry and the resolver contributes a documented frame-count constant,
//! and the sum is passed in as a [`FrameSkip`].

use std::collections::BTreeSet;

use tracing::trace;

use callguard_types::well_known::modules;
use callguard_types::Principal;

use crate::errors::InternalError;
use crate::stack::{Frame, StackWalker, ThreadStack};

/// Frames the resolver itself adds: [`CallerResolver::resolve_caller`].
pub const RESOLVER_FRAMES: usize = 1;

/// A validated, non-negative frame skip count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameSkip(usize);

impl FrameSkip {
    pub const fn new(frames: usize) -> Self {
        Self(frames)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl TryFrom<i64> for FrameSkip {
    type Error = InternalError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .map(FrameSkip)
            .map_err(|_| InternalError::NegativeSkip { value })
    }
}

/// Finds the principal responsible for the current call.
#[derive(Debug, Clone)]
pub struct CallerResolver<W: StackWalker = ThreadStack> {
    walker: W,
    trusted: BTreeSet<String>,
}

impl CallerResolver<ThreadStack> {
    pub fn new() -> Self {
        Self::with_walker(ThreadStack)
    }
}

impl Default for CallerResolver<ThreadStack> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: StackWalker> CallerResolver<W> {
    /// Resolver over `walker`, trusting the runtime and the guard support
    /// code.
    pub fn with_walker(walker: W) -> Self {
        Self {
            walker,
            trusted: BTreeSet::from([modules::RUNTIME.to_string(), modules::GUARD.to_string()]),
        }
    }

    pub fn walker(&self) -> &W {
        &self.walker
    }

    /// Whether `frame` is skipped during attribution regardless of position.
    ///
    /// Unnamed frames are never trusted.
    pub fn is_trusted(&self, frame: &Frame) -> bool {
        frame
            .principal
            .as_ref()
            .is_some_and(|p| self.trusted.contains(p.name()))
    }

    /// Skip `skip` frames innermost first, counting this call's own frame,
    /// then return the principal of the first untrusted frame.
    ///
    /// `None` means the stack ran out or the frame is unnamed. Either way the
    /// caller is unknown and must be denied.
    pub fn resolve_caller(&self, skip: FrameSkip) -> Option<Principal> {
        let _frame = self
            .walker
            .enter(Frame::support("callguard.bootstrap.CallerResolver.resolve_caller"));
        let frames = self.walker.frames();
        let caller = frames
            .into_iter()
            .skip(skip.get())
            .find(|frame| !self.is_trusted(frame));
        trace!(skip = skip.get(), caller = ?caller, "resolved caller frame");
        caller.and_then(|frame| frame.principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_skip_is_rejected() {
        assert_eq!(
            FrameSkip::try_from(-1),
            Err(InternalError::NegativeSkip { value: -1 })
        );
        assert_eq!(FrameSkip::try_from(3), Ok(FrameSkip::new(3)));
    }

    #[test]
    fn test_skip_counts_resolver_frame() {
        let resolver = CallerResolver::new();
        let stack = resolver.walker();
        let _main = stack.enter(Frame::module("app.main", "app.Main.main"));
        let _lib = stack.enter(Frame::module("app.lib", "app.Lib.call"));

        // The resolver's own frame is support code, trusted even unskipped.
        assert_eq!(
            resolver.resolve_caller(FrameSkip::new(0)),
            Some(Principal::module("app.lib"))
        );
        assert_eq!(
            resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES)),
            Some(Principal::module("app.lib"))
        );
        assert_eq!(
            resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES + 1)),
            Some(Principal::module("app.main"))
        );
        assert_eq!(resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES + 2)), None);
    }

    #[test]
    fn test_trusted_frames_are_passed_over() {
        let resolver = CallerResolver::new();
        let stack = resolver.walker();
        let _main = stack.enter(Frame::module("app.main", "app.Main.main"));
        let _rt1 = stack.enter(Frame::runtime("java.lang.System.exit"));
        let _rt2 = stack.enter(Frame::runtime("java.lang.Runtime.exit"));
        assert_eq!(
            resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES)),
            Some(Principal::module("app.main"))
        );
    }

    #[test]
    fn test_support_frames_are_never_the_caller() {
        let resolver = CallerResolver::new();
        let stack = resolver.walker();
        let _main = stack.enter(Frame::module("app.main", "app.Main.main"));
        let _support = stack.enter(Frame::support("callguard.bootstrap.Guard.check_permission"));
        assert!(resolver.is_trusted(&Frame::support("x")));
        assert_eq!(
            resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES)),
            Some(Principal::module("app.main"))
        );
    }

    #[test]
    fn test_only_trusted_frames_means_unknown() {
        let resolver = CallerResolver::new();
        let _rt = resolver
            .walker()
            .enter(Frame::runtime("java.lang.Thread.run"));
        assert_eq!(resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES)), None);
    }

    #[test]
    fn test_unnamed_frame_is_unknown_caller() {
        let resolver = CallerResolver::new();
        let stack = resolver.walker();
        let _main = stack.enter(Frame::module("app.main", "app.Main.main"));
        let _anon = stack.enter(Frame::unnamed("Script.eval"));
        assert_eq!(resolver.resolve_caller(FrameSkip::new(RESOLVER_FRAMES)), None);
    }
}
