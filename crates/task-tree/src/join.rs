//! Policy-driven parallel branch.
//!
//! A `Join` ticks every child that has not completed during the current run,
//! giving each child a fresh cancel token on entry, and leaves the decision
//! of when the branch completes to a [`JoinPolicy`].
//!
//! Each run records the reentry id of every child when it starts. A child
//! whose reentry id moved on and whose status is terminal has completed in
//! this run and is not ticked again until the `Join` itself is re-entered.

use std::any::Any;

use crate::composite::BranchKind;
use crate::scheduler::Scheduler;
use crate::{CancelToken, Result, Status, TaskId};

/// Counters a [`JoinPolicy`] decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinProgress {
    /// Live children of the join.
    pub child_count: usize,
    /// Children that completed during the current run.
    pub completed: usize,
    /// Children that succeeded during the current run.
    pub succeeded: usize,
}

impl JoinProgress {
    #[inline]
    pub fn all_completed(&self) -> bool {
        self.completed >= self.child_count
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.completed - self.succeeded
    }
}

/// What a join does with an event delivered to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinEventAction {
    Ignore,
    /// Deliver the event to the live child at this index.
    Forward(usize),
    /// Complete the join with this status.
    Complete(Status),
}

/// Completion strategy of a `Join`.
///
/// Decisions must depend only on the counters and the reported status, never
/// on the order in which children happened to complete.
pub trait JoinPolicy: Send {
    /// Called when the join is entered, before any child runs.
    fn enter(&mut self, _progress: &JoinProgress) -> Option<Status> {
        None
    }

    /// Called after the child at `index` completed with `status`. `progress`
    /// already accounts for it. Indices count live children only, so they
    /// never point at a slot detached during the current tick.
    ///
    /// Returning a status completes the join, stopping the children still
    /// running.
    fn on_child_completed(
        &mut self,
        progress: &JoinProgress,
        index: usize,
        status: Status,
    ) -> Option<Status>;

    /// Called after a child was detached from the running join. `progress`
    /// no longer accounts for it.
    ///
    /// Returning a status completes the join.
    fn on_child_detached(&mut self, _progress: &JoinProgress) -> Option<Status> {
        None
    }

    /// Inspects an event delivered to the join while it runs.
    fn on_event(&mut self, _progress: &JoinProgress, _event: &dyn Any) -> Result<JoinEventAction> {
        Ok(JoinEventAction::Ignore)
    }

    fn reset_for_restart(&mut self) {}
}

/// Succeeds iff every child succeeds, once all of them completed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinWaitAll;

impl JoinPolicy for JoinWaitAll {
    fn enter(&mut self, progress: &JoinProgress) -> Option<Status> {
        (progress.child_count == 0).then_some(Status::Success)
    }

    fn on_child_completed(&mut self, progress: &JoinProgress, _: usize, _: Status) -> Option<Status> {
        self.on_child_detached(progress)
    }

    fn on_child_detached(&mut self, progress: &JoinProgress) -> Option<Status> {
        if !progress.all_completed() {
            return None;
        }
        if progress.succeeded >= progress.child_count {
            Some(Status::Success)
        } else {
            Some(Status::ERROR)
        }
    }
}

/// Succeeds as soon as any child succeeds. Fails with [`Status::ERROR`] once
/// every child completed without a success.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinAnyOf;

impl JoinPolicy for JoinAnyOf {
    fn enter(&mut self, progress: &JoinProgress) -> Option<Status> {
        (progress.child_count == 0).then_some(Status::ERROR)
    }

    fn on_child_completed(&mut self, progress: &JoinProgress, _: usize, status: Status) -> Option<Status> {
        if status.is_success() {
            Some(Status::Success)
        } else {
            self.on_child_detached(progress)
        }
    }

    fn on_child_detached(&mut self, progress: &JoinProgress) -> Option<Status> {
        progress.all_completed().then_some(Status::ERROR)
    }
}

/// Mirrors child 0 and routes events to it. Other children run alongside
/// and are stopped when it completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinMain;

impl JoinPolicy for JoinMain {
    fn enter(&mut self, progress: &JoinProgress) -> Option<Status> {
        (progress.child_count == 0).then_some(Status::ERROR)
    }

    fn on_child_completed(&mut self, _: &JoinProgress, index: usize, status: Status) -> Option<Status> {
        (index == 0).then(|| status.outward())
    }

    fn on_child_detached(&mut self, progress: &JoinProgress) -> Option<Status> {
        self.enter(progress)
    }

    fn on_event(&mut self, _: &JoinProgress, _: &dyn Any) -> Result<JoinEventAction> {
        Ok(JoinEventAction::Forward(0))
    }
}

/// Selector rule over concurrently running children: the first success
/// wins, and the join fails once every child failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinSelector;

impl JoinPolicy for JoinSelector {
    fn enter(&mut self, progress: &JoinProgress) -> Option<Status> {
        (progress.child_count == 0).then_some(Status::ERROR)
    }

    fn on_child_completed(&mut self, progress: &JoinProgress, _: usize, status: Status) -> Option<Status> {
        if status.is_success() {
            Some(Status::Success)
        } else if progress.all_completed() {
            Some(status.outward())
        } else {
            None
        }
    }

    fn on_child_detached(&mut self, progress: &JoinProgress) -> Option<Status> {
        progress.all_completed().then_some(Status::ERROR)
    }
}

/// Sequence rule over concurrently running children: the first failure
/// wins, and the join succeeds once every child succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinSequence;

impl JoinPolicy for JoinSequence {
    fn enter(&mut self, progress: &JoinProgress) -> Option<Status> {
        (progress.child_count == 0).then_some(Status::Success)
    }

    fn on_child_completed(&mut self, progress: &JoinProgress, _: usize, status: Status) -> Option<Status> {
        if status.is_cancelled() || status.is_failure() {
            Some(status.outward())
        } else {
            self.on_child_detached(progress)
        }
    }

    fn on_child_detached(&mut self, progress: &JoinProgress) -> Option<Status> {
        progress.all_completed().then_some(Status::Success)
    }
}

/// Succeeds once `required` children succeeded; fails once every child
/// completed short of it.
#[derive(Debug, Clone, Copy)]
pub struct JoinSelectorN {
    required: u32,
}

impl JoinSelectorN {
    pub fn new(required: u32) -> Self {
        Self { required }
    }
}

impl JoinPolicy for JoinSelectorN {
    fn enter(&mut self, progress: &JoinProgress) -> Option<Status> {
        if self.required == 0 {
            Some(Status::Success)
        } else if progress.child_count == 0 {
            Some(Status::ERROR)
        } else {
            None
        }
    }

    fn on_child_completed(&mut self, progress: &JoinProgress, _: usize, _: Status) -> Option<Status> {
        self.on_child_detached(progress)
    }

    fn on_child_detached(&mut self, progress: &JoinProgress) -> Option<Status> {
        if progress.succeeded >= self.required as usize {
            Some(Status::Success)
        } else if progress.all_completed() {
            Some(Status::ERROR)
        } else {
            None
        }
    }
}

impl<B> Scheduler<'_, B> {
    fn join_progress(&self, id: TaskId) -> JoinProgress {
        let branch = self.tree.branch(id);
        JoinProgress {
            child_count: branch.children.real_size(),
            completed: branch.completed,
            succeeded: branch.succeeded,
        }
    }

    fn join_policy(&mut self, id: TaskId) -> &mut dyn JoinPolicy {
        match &mut self.tree.branch_mut(id).kind {
            BranchKind::Join(policy) => policy.as_mut(),
            _ => panic!("task {id} is not a join"),
        }
    }

    pub(crate) fn enter_join(&mut self, id: TaskId) {
        let children: Vec<TaskId> = self.tree.children(id).collect();
        for child in children {
            let core = self.tree.core_mut(child);
            core.control = Some(id);
            core.cancel_token = CancelToken::new();
        }
        self.capture_entry_ids(id);

        let progress = self.join_progress(id);
        if let Some(status) = self.join_policy(id).enter(&progress) {
            self.set_completed(id, status);
        }
    }

    pub(crate) fn execute_join(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        self.with_children_iter(id, |this| {
            let len = this.tree.branch(id).children.len();
            for index in 0..len {
                let Some(child) = this.tree.child_at(id, index) else {
                    continue;
                };
                let entry_id = this.ensure_entry_id(id, child);
                if this.completed_since(child, entry_id) {
                    continue;
                }
                this.run_child(id, child);
                if this.check_cancel(id, reentry_id) {
                    return;
                }
            }
        });
    }

    pub(crate) fn join_child_completed(&mut self, id: TaskId, child: TaskId) {
        let Some(index) = self.tree.children(id).position(|task| task == child) else {
            return;
        };
        let status = self.status(child);
        self.tree.branch_mut(id).count(status);

        let progress = self.join_progress(id);
        if let Some(result) = self.join_policy(id).on_child_completed(&progress, index, status) {
            self.set_completed(id, result);
        }
    }

    /// Forgets a detached child's outcome in this run and lets the policy
    /// decide on the remaining children.
    pub(crate) fn join_child_detached(&mut self, id: TaskId, child: TaskId, counted: bool) {
        if counted {
            let succeeded = self.status(child).is_success();
            let branch = self.tree.branch_mut(id);
            branch.completed -= 1;
            if succeeded {
                branch.succeeded -= 1;
            }
        }
        let progress = self.join_progress(id);
        if let Some(status) = self.join_policy(id).on_child_detached(&progress) {
            tracing::debug!(join = %id, %child, ?status, "join completed after detach");
            self.set_completed(id, status);
        }
    }

    pub(crate) fn join_event(&mut self, id: TaskId, event: &dyn Any) -> Result<()> {
        let progress = self.join_progress(id);
        match self.join_policy(id).on_event(&progress, event)? {
            JoinEventAction::Ignore => Ok(()),
            JoinEventAction::Forward(index) => {
                let child = self.tree.children(id).nth(index);
                match child {
                    Some(child) => self.dispatch_event(child, event),
                    None => Ok(()),
                }
            }
            JoinEventAction::Complete(status) => {
                self.set_completed(id, status);
                Ok(())
            }
        }
    }
}
