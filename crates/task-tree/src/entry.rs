//! Tree root and tick driver.

use std::any::Any;

use crate::fsm::StateChange;
use crate::scheduler::Scheduler;
use crate::tree::TaskType;
use crate::{CancelToken, NoopLoader, Result, Status, TaskId, TaskTree, TreeLoader};

/// Runs one tree against a blackboard.
///
/// `TaskEntry` owns the tree, the blackboard, the subtree loader and the
/// outermost cancel token, and is the only way to drive the tree: each call
/// to [`update`](Self::update) ticks the root once.
///
/// # Example
///
/// ```
/// use task_tree::{Status, TaskEntry, TaskTree};
///
/// let mut tree = TaskTree::new();
/// let count = tree.action(|ctx: &mut task_tree::LeafContext<'_, u32>| {
///     *ctx.blackboard() += 1;
///     if *ctx.blackboard() >= 3 { Status::Success } else { Status::Running }
/// });
/// let mut entry = TaskEntry::new(tree, count, 0u32);
///
/// assert_eq!(entry.update(1), Status::Running);
/// assert_eq!(entry.update(2), Status::Running);
/// assert_eq!(entry.update(3), Status::Success);
/// assert_eq!(*entry.blackboard(), 3);
/// ```
pub struct TaskEntry<B> {
    tree: TaskTree<B>,
    root: TaskId,
    blackboard: B,
    loader: Box<dyn TreeLoader<B>>,
    cancel_token: CancelToken,
    frame: u64,
}

impl<B> TaskEntry<B> {
    pub fn new(tree: TaskTree<B>, root: TaskId, blackboard: B) -> Self {
        Self {
            tree,
            root,
            blackboard,
            loader: Box::new(NoopLoader),
            cancel_token: CancelToken::new(),
            frame: 0,
        }
    }

    /// Replaces the loader used by `SubtreeRef` nodes.
    pub fn with_loader(mut self, loader: impl TreeLoader<B> + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Uses `token` as the outermost cancel token, e.g. a child of a token
    /// owned by the caller.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = token;
        self
    }

    fn scheduler(&mut self) -> Scheduler<'_, B> {
        Scheduler::new(
            &mut self.tree,
            &mut self.blackboard,
            self.loader.as_mut(),
            self.frame,
        )
    }

    /// Ticks the root once and returns its status.
    ///
    /// `frame` is the caller's monotonically non-decreasing frame counter.
    /// Once the root completed, updates are no-ops until
    /// [`reset_for_restart`](Self::reset_for_restart).
    pub fn update(&mut self, frame: u64) -> Status {
        debug_assert!(frame >= self.frame, "frame counter went backwards");
        self.frame = frame;
        let root = self.root;
        if self.tree.status(root).is_completed() {
            return self.tree.status(root);
        }

        if !self.tree.is_running(root) {
            let core = self.tree.core_mut(root);
            core.control = None;
            core.cancel_token = self.cancel_token.clone();
        }
        self.scheduler().template_execute(root, true);

        let status = self.tree.status(root);
        if status.is_completed() {
            tracing::debug!(root = %root, frame, ?status, "task entry completed");
        }
        status
    }

    /// Delivers an event down the active path.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler on the path. The tree is
    /// left as it was when the handler failed and can be ticked again.
    pub fn on_event(&mut self, event: &dyn Any) -> Result<()> {
        let root = self.root;
        self.scheduler().dispatch_event(root, event)
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.tree.status(self.root)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.tree.is_running(self.root)
    }

    /// Frame of the last update.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn root(&self) -> TaskId {
        self.root
    }

    pub fn tree(&self) -> &TaskTree<B> {
        &self.tree
    }

    /// Mutable access to the tree, e.g. to attach children at runtime.
    pub fn tree_mut(&mut self) -> &mut TaskTree<B> {
        &mut self.tree
    }

    pub fn blackboard(&self) -> &B {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut B {
        &mut self.blackboard
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel_token
    }

    /// Requests cancellation. The tree observes it at its next checkpoint,
    /// at the latest on the next update.
    pub fn cancel(&self, code: u32) {
        self.cancel_token.cancel(code);
    }

    /// Cancels the running tree immediately.
    pub fn stop(&mut self) {
        let root = self.root;
        self.scheduler().stop(root);
    }

    /// Stops the tree if it runs, then returns every task and the cancel
    /// token to their initial state.
    pub fn reset_for_restart(&mut self) {
        self.stop();
        self.tree.reset_for_restart(self.root);
        self.cancel_token.reset();
    }

    /// Switches the state machine `fsm` to `state`.
    pub fn change_state(&mut self, fsm: TaskId, state: TaskId) {
        self.request(fsm, StateChange::Enter(state));
    }

    /// Leaves the current state of `fsm` without entering another.
    pub fn clear_state(&mut self, fsm: TaskId) {
        self.request(fsm, StateChange::Clear);
    }

    /// Returns `fsm` to its previous state. Returns `false` if the undo
    /// history is empty.
    pub fn undo_change_state(&mut self, fsm: TaskId) -> bool {
        if self.tree.undo_history(fsm).next().is_none() {
            return false;
        }
        self.request(fsm, StateChange::Undo);
        true
    }

    /// Replays the state most recently undone on `fsm`. Returns `false` if
    /// the redo history is empty.
    pub fn redo_change_state(&mut self, fsm: TaskId) -> bool {
        if self.tree.redo_history(fsm).next().is_none() {
            return false;
        }
        self.request(fsm, StateChange::Redo);
        true
    }

    fn request(&mut self, fsm: TaskId, change: StateChange) {
        assert_eq!(
            self.tree.task_type(fsm),
            TaskType::StateMachine,
            "task {fsm} is not a state machine"
        );
        self.scheduler().request_state_change(fsm, change);
    }
}
