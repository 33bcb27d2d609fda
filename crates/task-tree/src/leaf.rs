//! Stock leaf actions.
//!
//! Small, context-independent leaves plus closure adapters, so trees can be
//! assembled without declaring a type per action.

use std::fmt;

use crate::{Action, LeafContext, Status};

/// Succeeds immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Success;

impl<B> Action<B> for Success {
    fn execute(&mut self, _ctx: &mut LeafContext<'_, B>) -> Status {
        Status::Success
    }
}

/// Fails immediately with a fixed code.
#[derive(Debug, Clone, Copy)]
pub struct Failure {
    code: u16,
}

impl Failure {
    pub fn new(code: u16) -> Self {
        Self { code }
    }
}

impl Default for Failure {
    fn default() -> Self {
        Self::new(crate::codes::ERROR)
    }
}

impl<B> Action<B> for Failure {
    fn execute(&mut self, _ctx: &mut LeafContext<'_, B>) -> Status {
        Status::failed(self.code)
    }
}

/// Never completes on its own; only cancellation ends it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Running;

impl<B> Action<B> for Running {
    fn execute(&mut self, _ctx: &mut LeafContext<'_, B>) -> Status {
        Status::Running
    }
}

/// Succeeds once the given number of frames has elapsed since entry.
///
/// Timing is expressed purely in the caller's frame counter; a wait of zero
/// frames succeeds on the entering tick.
#[derive(Debug, Clone, Copy)]
pub struct WaitFrame {
    frames: u64,
}

impl WaitFrame {
    pub fn new(frames: u64) -> Self {
        Self { frames }
    }
}

impl<B> Action<B> for WaitFrame {
    fn execute(&mut self, ctx: &mut LeafContext<'_, B>) -> Status {
        if ctx.elapsed_frames() >= self.frames {
            Status::Success
        } else {
            Status::Running
        }
    }
}

/// Adapts a closure into an action.
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAction")
    }
}

impl<B, F> Action<B> for FnAction<F>
where
    F: FnMut(&mut LeafContext<'_, B>) -> Status + Send,
{
    fn execute(&mut self, ctx: &mut LeafContext<'_, B>) -> Status {
        (self.f)(ctx)
    }
}

/// Adapts a predicate over the blackboard into a condition leaf.
///
/// `true` maps to `Success`, `false` to the default failure. Conditions are
/// the usual building block for guards.
pub struct Condition<F> {
    predicate: F,
}

impl<F> Condition<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> fmt::Debug for Condition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition")
    }
}

impl<B, F> Action<B> for Condition<F>
where
    F: FnMut(&B) -> bool + Send,
{
    fn execute(&mut self, ctx: &mut LeafContext<'_, B>) -> Status {
        if (self.predicate)(ctx.blackboard()) {
            Status::Success
        } else {
            Status::ERROR
        }
    }
}
