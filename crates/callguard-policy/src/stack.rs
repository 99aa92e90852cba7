//! Call-stack capability used for caller attribution.
//!
//! [`StackWalker`] is the seam between the policy engine and whatever the
//! host can tell about the current thread's call stack. [`ThreadStack`] is the
//! in-process implementation: code announces the frames it runs in with
//! [`StackWalker::enter`], and the returned [`FrameGuard`] pops the frame
//! when it goes out of scope.
//!
//! # Usage
//!
//! ```
//! use callguard_policy::stack::{Frame, StackWalker, ThreadStack};
//!
//! let stack = ThreadStack;
//! let _outer = stack.enter(Frame::module("app.main", "app.Main.main"));
//! {
//!     let _inner = stack.enter(Frame::module("app.util", "app.Util.run"));
//!     assert_eq!(stack.frames()[0].symbol, "app.Util.run");
//! }
//! assert_eq!(stack.frames().len(), 1);
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;

use callguard_types::well_known::modules;
use callguard_types::Principal;

/// One activation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Compilation unit the frame's code belongs to; `None` for unnamed code.
    pub principal: Option<Principal>,
    /// Human-readable location, e.g. `app.Main.main`.
    pub symbol: String,
}

impl Frame {
    pub fn new(principal: Principal, symbol: impl Into<String>) -> Self {
        Self {
            principal: Some(principal),
            symbol: symbol.into(),
        }
    }

    pub fn module(name: &str, symbol: impl Into<String>) -> Self {
        Self::new(Principal::module(name), symbol)
    }

    /// Code that belongs to no named compilation unit.
    pub fn unnamed(symbol: impl Into<String>) -> Self {
        Self {
            principal: None,
            symbol: symbol.into(),
        }
    }

    /// A frame of the runtime that owns the guarded operations.
    pub fn runtime(symbol: impl Into<String>) -> Self {
        Self::module(modules::RUNTIME, symbol)
    }

    /// A frame of the guard support code itself.
    pub fn support(symbol: impl Into<String>) -> Self {
        Self::module(modules::GUARD, symbol)
    }
}

/// Access to the calling thread's stack.
pub trait StackWalker: Send + Sync {
    /// Push `frame` for the lifetime of the returned guard.
    fn enter(&self, frame: Frame) -> FrameGuard;

    /// The calling thread's frames, innermost first.
    fn frames(&self) -> Vec<Frame>;
}

/// Pops a frame entered through a [`StackWalker`] when dropped.
///
/// Must be dropped on the thread that created it.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard {
    pop: Option<fn()>,
    _thread_bound: PhantomData<*const ()>,
}

impl FrameGuard {
    /// A guard that calls `pop` on drop.
    pub fn new(pop: fn()) -> Self {
        Self {
            pop: Some(pop),
            _thread_bound: PhantomData,
        }
    }

    /// A guard with nothing to pop, for walkers that observe the stack
    /// instead of recording it.
    pub fn detached() -> Self {
        Self {
            pop: None,
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(pop) = self.pop.take() {
            pop();
        }
    }
}

impl std::fmt::Debug for FrameGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGuard")
            .field("detached", &self.pop.is_none())
            .finish()
    }
}

thread_local! {
    static SHADOW_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

fn pop_shadow_frame() {
    SHADOW_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Thread-local shadow stack.
///
/// Every thread sees only its own frames, so no locking is involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStack;

impl ThreadStack {
    /// Number of frames on the calling thread.
    pub fn depth(&self) -> usize {
        SHADOW_STACK.with(|stack| stack.borrow().len())
    }
}

impl StackWalker for ThreadStack {
    fn enter(&self, frame: Frame) -> FrameGuard {
        SHADOW_STACK.with(|stack| stack.borrow_mut().push(frame));
        FrameGuard::new(pop_shadow_frame)
    }

    fn frames(&self) -> Vec<Frame> {
        SHADOW_STACK.with(|stack| stack.borrow().iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_innermost_first() {
        let stack = ThreadStack;
        let _a = stack.enter(Frame::module("app.a", "a"));
        let _b = stack.enter(Frame::unnamed("b"));
        let _c = stack.enter(Frame::runtime("c"));
        let symbols: Vec<String> = stack.frames().into_iter().map(|f| f.symbol).collect();
        assert_eq!(symbols, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_guard_pops_on_drop() {
        let stack = ThreadStack;
        let before = stack.depth();
        {
            let _frame = stack.enter(Frame::support("x"));
            assert_eq!(stack.depth(), before + 1);
        }
        assert_eq!(stack.depth(), before);
    }

    #[test]
    fn test_threads_do_not_share_frames() {
        let stack = ThreadStack;
        let _frame = stack.enter(Frame::module("app.main", "main"));
        let other = std::thread::spawn(move || ThreadStack.frames().len())
            .join()
            .unwrap();
        assert_eq!(other, 0);
        assert_eq!(stack.frames().len(), 1);
    }

    #[test]
    fn test_detached_guard_is_inert() {
        let stack = ThreadStack;
        let _frame = stack.enter(Frame::module("app.main", "main"));
        drop(FrameGuard::detached());
        assert_eq!(stack.depth(), 1);
    }
}
