//! Task lifecycle protocol.
//!
//! [`Scheduler`] borrows a tree together with the blackboard, the subtree
//! loader and the current frame for the duration of one `update` or event
//! delivery, and implements the transitions shared by every node kind:
//!
//! - `template_execute`: guard check, enter, cancel checkpoint, execute
//! - `run_child`: the only way a controller advances a child
//! - `set_completed`: stop running children, exit, notify the controller
//! - `stop`: top-down cancellation of the live path, without notification
//!
//! # Reentry
//!
//! Completion notifications are delivered synchronously up the call chain,
//! so running a child can complete, reset or even re-enter the caller before
//! `run_child` returns. Every controller therefore captures its own
//! `reentry_id` before running a child and calls
//! [`check_cancel`](Scheduler::check_cancel) afterwards; when it reports
//! `true` the controller returns without touching its own state again.

use std::any::Any;

use crate::fsm::StateChange;
use crate::tree::{Node, TaskKind, TaskType};
use crate::{ChildEdit, LeafContext, Result, Status, TaskId, TaskTree, TreeLoader};

/// Changes a leaf queued on its context during one callback.
#[derive(Debug)]
struct LeafRequests {
    state: Option<StateChange>,
    edits: Vec<ChildEdit>,
}

pub(crate) struct Scheduler<'a, B> {
    pub(crate) tree: &'a mut TaskTree<B>,
    pub(crate) blackboard: &'a mut B,
    pub(crate) loader: &'a mut dyn TreeLoader<B>,
    pub(crate) frame: u64,
}

impl<'a, B> Scheduler<'a, B> {
    pub(crate) fn new(
        tree: &'a mut TaskTree<B>,
        blackboard: &'a mut B,
        loader: &'a mut dyn TreeLoader<B>,
        frame: u64,
    ) -> Self {
        Self {
            tree,
            blackboard,
            loader,
            frame,
        }
    }

    // ------------------------------------------------------------------
    // State queries
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn status(&self, id: TaskId) -> Status {
        self.tree.status(id)
    }

    #[inline]
    pub(crate) fn is_running(&self, id: TaskId) -> bool {
        self.tree.is_running(id)
    }

    #[inline]
    pub(crate) fn reentry_id(&self, id: TaskId) -> u32 {
        self.tree.reentry_id(id)
    }

    #[inline]
    pub(crate) fn is_executing(&self, id: TaskId) -> bool {
        self.tree.core(id).executing > 0
    }

    #[inline]
    pub(crate) fn task_type(&self, id: TaskId) -> TaskType {
        self.tree.task_type(id)
    }

    /// Cancel checkpoint.
    ///
    /// Returns `true` if the task was re-entered or exited since `reentry_id`
    /// was captured, or if its token requests cancellation, in which case the
    /// task is cancelled here.
    pub(crate) fn check_cancel(&mut self, id: TaskId, reentry_id: u32) -> bool {
        if self.tree.is_exited(id, reentry_id) {
            return true;
        }
        if self.tree.cancel_token(id).is_cancelling() {
            self.set_completed(id, Status::Cancelled);
            return true;
        }
        false
    }

    /// Returns `true` if `child` completed during the run its controller
    /// captured as `entry_id`.
    pub(crate) fn completed_since(&self, child: TaskId, entry_id: u32) -> bool {
        let core = self.tree.core(child);
        core.status.is_completed() && core.reentry_id != entry_id
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Runs one step of a task, entering it first if it is not running.
    ///
    /// Returns `true` if the task's guard rejected it. In that case the task
    /// was not entered and nobody was notified.
    pub(crate) fn template_execute(&mut self, id: TaskId, check_guard: bool) -> bool {
        if !self.is_running(id) {
            if check_guard
                && let Some(guard) = self.tree.guard(id)
                && !self.check_guard(guard)
            {
                self.mark_guard_failed(id);
                return true;
            }
            self.template_enter(id);
        }

        let reentry_id = self.reentry_id(id);
        if self.check_cancel(id, reentry_id) {
            return false;
        }

        self.tree.core_mut(id).executing += 1;
        self.execute_kind(id);
        self.tree.core_mut(id).executing -= 1;
        false
    }

    fn template_enter(&mut self, id: TaskId) {
        let frame = self.frame;
        let node = self.tree.node_mut(id);
        let restarting = node.core.status.is_completed();
        node.core.remember_status();
        node.core.reentry_id = node.core.reentry_id.wrapping_add(1);
        node.core.status = Status::Running;
        node.core.enter_frame = frame;
        node.kind.reset_transient(restarting);
        tracing::trace!(task = %id, reentry = node.core.reentry_id, "enter");

        match self.task_type(id) {
            TaskType::Leaf => self.enter_leaf(id),
            TaskType::StateMachine => self.enter_state_machine(id),
            kind if kind.is_branch() => self.enter_branch(id),
            _ => self.enter_decorator(id),
        }
    }

    fn execute_kind(&mut self, id: TaskId) {
        match self.task_type(id) {
            TaskType::Leaf => self.execute_leaf(id),
            TaskType::StateMachine => self.execute_state_machine(id),
            kind if kind.is_branch() => self.execute_branch(id),
            _ => self.execute_decorator(id),
        }
    }

    /// A guard rejection counts as an entry that exits immediately: the
    /// reentry id advances so run-tracking controllers see the attempt, but
    /// no enter/exit hook runs and the controller is not notified by the
    /// child.
    fn mark_guard_failed(&mut self, id: TaskId) {
        let frame = self.frame;
        let core = self.tree.core_mut(id);
        core.remember_status();
        core.reentry_id = core.reentry_id.wrapping_add(1);
        core.status = Status::GuardFailed;
        core.enter_frame = frame;
        core.exit_frame = frame;
        tracing::trace!(task = %id, "guard failed");
    }

    /// Evaluates a guard in isolation and reports whether it passed.
    ///
    /// The guard runs for a single step; a guard still running afterwards is
    /// stopped and counts as failed.
    pub(crate) fn check_guard(&mut self, guard: TaskId) -> bool {
        assert!(
            !self.is_running(guard),
            "guard {guard} is already being evaluated"
        );
        self.tree.core_mut(guard).control = None;
        self.template_execute(guard, true);
        if self.is_running(guard) {
            self.stop(guard);
            return false;
        }
        self.status(guard).is_success()
    }

    /// Runs a child of `parent` for one step, checking the child's guard.
    pub(crate) fn run_child(&mut self, parent: TaskId, child: TaskId) {
        self.run_child_with(parent, child, true);
    }

    /// Runs a child whose guard the controller has already evaluated.
    pub(crate) fn run_child_directly(&mut self, parent: TaskId, child: TaskId) {
        self.run_child_with(parent, child, false);
    }

    fn run_child_with(&mut self, parent: TaskId, child: TaskId, check_guard: bool) {
        if !self.is_running(child) {
            let token = self
                .tree
                .shares_token(parent)
                .then(|| self.tree.cancel_token(parent).clone());
            let core = self.tree.core_mut(child);
            core.control = Some(parent);
            if let Some(token) = token {
                core.cancel_token = token;
            }
        }
        if self.template_execute(child, check_guard) {
            self.on_child_completed(parent, child);
        }
    }

    /// Exits a running task with `status` and notifies its controller.
    ///
    /// Running children are stopped first. Calls on a task that is not
    /// running are ignored.
    pub(crate) fn set_completed(&mut self, id: TaskId, status: Status) {
        assert!(
            status.is_completed(),
            "task {id} cannot complete with {status:?}"
        );
        if !self.is_running(id) {
            return;
        }
        self.stop_running_children(id);

        let frame = self.frame;
        let core = self.tree.core_mut(id);
        core.status = status;
        core.exit_frame = frame;
        let control = core.control;
        self.exit_kind(id);
        tracing::trace!(task = %id, ?status, "exit");

        if let Some(control) = control {
            self.on_child_completed(control, id);
        }
    }

    #[inline]
    pub(crate) fn set_success(&mut self, id: TaskId) {
        self.set_completed(id, Status::Success);
    }

    #[inline]
    pub(crate) fn set_failed(&mut self, id: TaskId, code: u16) {
        self.set_completed(id, Status::failed(code));
    }

    #[inline]
    pub(crate) fn set_cancelled(&mut self, id: TaskId) {
        self.set_completed(id, Status::Cancelled);
    }

    /// Cancels a running task and, first, every running task below it.
    /// The controller is not notified; it is the one asking.
    pub(crate) fn stop(&mut self, id: TaskId) {
        if !self.is_running(id) {
            return;
        }
        self.stop_running_children(id);

        let frame = self.frame;
        let core = self.tree.core_mut(id);
        core.status = Status::Cancelled;
        core.exit_frame = frame;
        self.exit_kind(id);
        tracing::trace!(task = %id, "stopped");
    }

    fn stop_running_children(&mut self, id: TaskId) {
        match self.task_type(id) {
            TaskType::Leaf => {}
            TaskType::StateMachine => {
                if let Some(state) = self.tree.fsm(id).current {
                    self.stop(state);
                }
            }
            kind if kind.is_branch() => {
                self.with_children_iter(id, |this| {
                    let len = this.tree.branch(id).children.len();
                    for index in 0..len {
                        if let Some(child) = this.tree.child_at(id, index) {
                            this.stop(child);
                        }
                    }
                });
            }
            _ => {
                if let Some(child) = self.tree.decorator(id).child {
                    self.stop(child);
                }
            }
        }
    }

    fn exit_kind(&mut self, id: TaskId) {
        if self.task_type(id) == TaskType::Leaf {
            self.exit_leaf(id);
        }
    }

    /// Routes a child's completion to its controller's policy.
    pub(crate) fn on_child_completed(&mut self, parent: TaskId, child: TaskId) {
        if !self.is_running(parent) {
            return;
        }
        match self.task_type(parent) {
            TaskType::Leaf => unreachable!("leaf {parent} cannot control {child}"),
            TaskType::StateMachine => self.state_completed(parent, child),
            kind if kind.is_branch() => self.branch_child_completed(parent, child),
            _ => self.decorator_child_completed(parent, child),
        }
    }

    /// Runs `f` inside an iteration bracket over the branch's children.
    pub(crate) fn with_children_iter<R>(
        &mut self,
        id: TaskId,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.tree.branch_mut(id).children.begin_iter();
        let result = f(self);
        let branch = self.tree.branch_mut(id);
        if branch.children.recursion_depth() == 1 {
            branch.cursor = branch.children.compacted_index(branch.cursor);
        }
        branch.children.end_iter();
        result
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    fn apply_child_edit(&mut self, edit: ChildEdit) {
        match edit {
            ChildEdit::Attach { parent, child } => {
                self.tree.add_child(parent, child);
                tracing::trace!(task = %parent, %child, "child attached");
            }
            ChildEdit::Detach { parent, child } => {
                self.detach_child(parent, child);
            }
        }
    }

    /// Detaches `child` from the branch `parent`, stopping it first.
    ///
    /// A running parent is told so that it can drop its bookkeeping for the
    /// child and, for a join, re-evaluate its policy.
    ///
    /// # Panics
    ///
    /// Panics when asked to detach the main task of a running parallel.
    pub(crate) fn detach_child(&mut self, parent: TaskId, child: TaskId) -> bool {
        let Some(index) = self.tree.index_of_child(parent, child) else {
            tracing::warn!(task = %parent, %child, "detach requested for a task that is not a child");
            return false;
        };
        let parent_running = self.is_running(parent);
        assert!(
            !(parent_running
                && index == 0
                && matches!(
                    self.task_type(parent),
                    TaskType::SimpleParallel | TaskType::ServiceParallel
                )),
            "main task {child} of parallel {parent} cannot be detached while it runs"
        );

        let counted = parent_running && self.completed_in_run(parent, child);
        self.stop(child);
        self.tree.remove_child(parent, index);
        tracing::trace!(task = %parent, %child, index, "child detached");
        if parent_running {
            self.branch_child_detached(parent, child, index, counted);
        }
        true
    }

    /// Returns `true` if `child` completed during `parent`'s current run, as
    /// far as `parent`'s run tracking can tell.
    fn completed_in_run(&self, parent: TaskId, child: TaskId) -> bool {
        if self.is_running(child) {
            return false;
        }
        match self.tree.branch(parent).entry_id(child) {
            Some(entry_id) => self.completed_since(child, entry_id),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Delivers an event down the active path below `id`.
    pub(crate) fn dispatch_event(&mut self, id: TaskId, event: &dyn Any) -> Result<()> {
        if !self.is_running(id) {
            return Ok(());
        }
        match self.task_type(id) {
            TaskType::Leaf => self.leaf_event(id, event),
            TaskType::StateMachine => match self.tree.fsm(id).current {
                Some(state) => self.dispatch_event(state, event),
                None => Ok(()),
            },
            kind if kind.is_branch() => self.branch_event(id, event),
            _ => match self.tree.decorator(id).child {
                Some(child) => self.dispatch_event(child, event),
                None => Ok(()),
            },
        }
    }

    // ------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------

    /// Calls into a leaf's action with a freshly built context and returns the
    /// callback's result together with the changes it requested.
    fn with_leaf<R>(
        &mut self,
        id: TaskId,
        f: impl FnOnce(&mut Box<dyn crate::Action<B>>, &mut LeafContext<'_, B>) -> R,
    ) -> (R, LeafRequests) {
        let Scheduler {
            tree,
            blackboard,
            frame,
            ..
        } = self;
        let Node { core, kind } = tree.node_mut(id);
        let TaskKind::Leaf(action) = kind else {
            unreachable!("task {id} is not a leaf");
        };
        let prev_status = core.prev_status();
        let mut ctx = LeafContext::new(
            &mut **blackboard,
            id,
            core.control,
            *frame,
            core.enter_frame,
            core.reentry_id,
            prev_status,
            &core.cancel_token,
        );
        let result = f(action, &mut ctx);
        let (state, edits) = ctx.take_requests();
        (result, LeafRequests { state, edits })
    }

    /// Applies what a leaf queued during a callback: structural edits first,
    /// then its state change. Returns `true` if anything was applied.
    fn apply_leaf_requests(&mut self, id: TaskId, requests: LeafRequests) -> bool {
        let LeafRequests { state, edits } = requests;
        let applied = state.is_some() || !edits.is_empty();
        for edit in edits {
            self.apply_child_edit(edit);
        }
        if let Some(request) = state {
            self.forward_state_request(id, request);
        }
        applied
    }

    fn enter_leaf(&mut self, id: TaskId) {
        let ((), requests) = self.with_leaf(id, |action, ctx| action.enter(ctx));
        self.apply_leaf_requests(id, requests);
    }

    fn execute_leaf(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        let (status, requests) = self.with_leaf(id, |action, ctx| action.execute(ctx));
        if self.apply_leaf_requests(id, requests) && self.tree.is_exited(id, reentry_id) {
            return;
        }
        self.apply_leaf_status(id, status);
    }

    fn leaf_event(&mut self, id: TaskId, event: &dyn Any) -> Result<()> {
        let reentry_id = self.reentry_id(id);
        let (result, requests) = self.with_leaf(id, |action, ctx| action.on_event(ctx, event));
        let status = result.inspect_err(|err| {
            tracing::warn!(task = %id, error = %err, "event handler failed");
        })?;
        if self.apply_leaf_requests(id, requests) && self.tree.is_exited(id, reentry_id) {
            return Ok(());
        }
        self.apply_leaf_status(id, status);
        Ok(())
    }

    fn apply_leaf_status(&mut self, id: TaskId, status: Status) {
        match status {
            Status::Running => {}
            Status::New => {
                debug_assert!(false, "leaf {id} returned New");
            }
            status => self.set_completed(id, status),
        }
    }

    fn exit_leaf(&mut self, id: TaskId) {
        let ((), requests) = self.with_leaf(id, |action, ctx| action.exit(ctx));
        if requests.state.is_some() || !requests.edits.is_empty() {
            tracing::debug!(task = %id, ?requests, "changes requested from exit ignored");
        }
    }

    /// Hands a leaf's state change request to the nearest enclosing state
    /// machine.
    fn forward_state_request(&mut self, from: TaskId, request: StateChange) {
        let mut cursor = self.tree.control(from);
        while let Some(id) = cursor {
            if self.task_type(id) == TaskType::StateMachine {
                self.request_state_change(id, request);
                return;
            }
            cursor = self.tree.control(id);
        }
        tracing::warn!(task = %from, ?request, "no enclosing state machine for state change");
    }
}
