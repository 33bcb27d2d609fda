//! Leaf behavior trait.
//!
//! This module defines the [`Action`] trait, the extension point for user
//! logic. Actions never see the tree: they receive a [`LeafContext`] giving
//! access to the blackboard and the task's run information, and report their
//! outcome by returning a [`Status`]. The runtime applies the transition and
//! drives the completion chain, so user code cannot observe a half-updated
//! tree. Changes to the tree itself (state switches, attaching or detaching
//! children) are queued on the context and applied by the runtime once the
//! callback returns.

use std::any::Any;

use crate::fsm::StateChange;
use crate::{CancelToken, Result, Status, TaskId};

/// Structural change a leaf asks for while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEdit {
    /// Append `child` to the branch `parent`.
    Attach { parent: TaskId, child: TaskId },
    /// Detach `child` from the branch `parent`, stopping it first if it runs.
    Detach { parent: TaskId, child: TaskId },
}

/// User logic plugged into a leaf task.
pub trait Action<B>: Send {
    /// Called once when the leaf is entered, before the first `execute`.
    fn enter(&mut self, _ctx: &mut LeafContext<'_, B>) {}

    /// Advances the action.
    ///
    /// # Returns
    ///
    /// - `Status::Running` to be ticked again on a later frame
    /// - any completed status to exit the leaf with it
    fn execute(&mut self, ctx: &mut LeafContext<'_, B>) -> Status;

    /// Handles an event delivered while the leaf is running.
    ///
    /// Returning `Running` leaves the task untouched; a completed status exits
    /// the leaf immediately. Errors abort the current event delivery and leave
    /// the task running.
    fn on_event(&mut self, _ctx: &mut LeafContext<'_, B>, _event: &dyn Any) -> Result<Status> {
        Ok(Status::Running)
    }

    /// Called once when the leaf leaves `Running`, whatever the reason.
    fn exit(&mut self, _ctx: &mut LeafContext<'_, B>) {}

    /// Clears per-run state. Configuration must be preserved.
    fn reset_for_restart(&mut self) {}
}

/// Boxed actions are actions too, which lets heterogeneous leaves be stored
/// and passed around uniformly.
impl<B> Action<B> for Box<dyn Action<B>> {
    fn enter(&mut self, ctx: &mut LeafContext<'_, B>) {
        (**self).enter(ctx);
    }

    #[inline]
    fn execute(&mut self, ctx: &mut LeafContext<'_, B>) -> Status {
        (**self).execute(ctx)
    }

    fn on_event(&mut self, ctx: &mut LeafContext<'_, B>, event: &dyn Any) -> Result<Status> {
        (**self).on_event(ctx, event)
    }

    fn exit(&mut self, ctx: &mut LeafContext<'_, B>) {
        (**self).exit(ctx);
    }

    fn reset_for_restart(&mut self) {
        (**self).reset_for_restart();
    }
}

/// Everything a leaf may see while it runs.
pub struct LeafContext<'a, B> {
    blackboard: &'a mut B,
    task: TaskId,
    control: Option<TaskId>,
    frame: u64,
    enter_frame: u64,
    reentry_id: u32,
    prev_status: Status,
    cancel_token: &'a CancelToken,
    request: Option<StateChange>,
    edits: Vec<ChildEdit>,
}

impl<'a, B> LeafContext<'a, B> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        blackboard: &'a mut B,
        task: TaskId,
        control: Option<TaskId>,
        frame: u64,
        enter_frame: u64,
        reentry_id: u32,
        prev_status: Status,
        cancel_token: &'a CancelToken,
    ) -> Self {
        Self {
            blackboard,
            task,
            control,
            frame,
            enter_frame,
            reentry_id,
            prev_status,
            cancel_token,
            request: None,
            edits: Vec::new(),
        }
    }

    /// The caller-owned context threaded through the tree.
    #[inline]
    pub fn blackboard(&mut self) -> &mut B {
        self.blackboard
    }

    /// Handle of the running leaf.
    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The leaf's controller, if it is attached to one.
    #[inline]
    pub fn control(&self) -> Option<TaskId> {
        self.control
    }

    /// Frame passed to the current `TaskEntry::update`.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Frame at which the leaf was last entered.
    #[inline]
    pub fn enter_frame(&self) -> u64 {
        self.enter_frame
    }

    /// Frames elapsed since the leaf was entered.
    #[inline]
    pub fn elapsed_frames(&self) -> u64 {
        self.frame.saturating_sub(self.enter_frame)
    }

    #[inline]
    pub fn reentry_id(&self) -> u32 {
        self.reentry_id
    }

    /// Status the leaf held before it was last entered.
    #[inline]
    pub fn prev_status(&self) -> Status {
        self.prev_status
    }

    #[inline]
    pub fn cancel_token(&self) -> &CancelToken {
        self.cancel_token
    }

    /// Asks the nearest enclosing state machine to switch to `state`.
    ///
    /// The request is applied after the current callback returns. A later
    /// request in the same callback replaces an earlier one.
    pub fn change_state(&mut self, state: TaskId) {
        self.request = Some(StateChange::Enter(state));
    }

    /// Asks the nearest enclosing state machine to drop its current state.
    pub fn clear_state(&mut self) {
        self.request = Some(StateChange::Clear);
    }

    /// Asks the nearest enclosing state machine to return to its previous
    /// state.
    pub fn undo_state(&mut self) {
        self.request = Some(StateChange::Undo);
    }

    /// Asks the nearest enclosing state machine to replay an undone state.
    pub fn redo_state(&mut self) {
        self.request = Some(StateChange::Redo);
    }

    /// Appends `child` to the branch `parent` once the callback returns.
    ///
    /// A branch walking its children this tick reaches the new child on a
    /// later pass; indices of existing children never move.
    pub fn attach_child(&mut self, parent: TaskId, child: TaskId) {
        self.edits.push(ChildEdit::Attach { parent, child });
    }

    /// Detaches `child` from the branch `parent` once the callback returns.
    ///
    /// A running child is stopped first. While `parent` is walking its
    /// children the slot is only cleared, so the walk carries on with the
    /// following siblings and the list compacts when the walk ends. Detaching
    /// the leaf itself, or one of its ancestors, is allowed.
    pub fn detach_child(&mut self, parent: TaskId, child: TaskId) {
        self.edits.push(ChildEdit::Detach { parent, child });
    }

    /// Detaches `sibling` from this leaf's controller.
    pub fn detach_sibling(&mut self, sibling: TaskId) {
        match self.control {
            Some(parent) => self.detach_child(parent, sibling),
            None => tracing::warn!(task = %self.task, %sibling, "detached leaf has no siblings"),
        }
    }

    pub(crate) fn take_requests(&mut self) -> (Option<StateChange>, Vec<ChildEdit>) {
        (self.request.take(), std::mem::take(&mut self.edits))
    }
}
