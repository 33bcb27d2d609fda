//! Task arena.
//!
//! A [`TaskTree`] owns every task of one behavior tree. Controllers reference
//! their children by [`TaskId`] and children point back to their controller by
//! handle only, so the structure has no ownership cycles. The tree is pure
//! data: running it is the job of [`TaskEntry`](crate::TaskEntry).

use crate::composite::{Branch, BranchKind};
use crate::decorator::{Decorator, DecoratorKind};
use crate::fsm::{StateMachine, StateMachineHandler};
use crate::task::TaskCore;
use crate::{Action, CancelToken, Status, TaskId, TreeConfig};

/// Node kinds, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Leaf,
    Sequence,
    Selector,
    SelectorN,
    Foreach,
    Switch,
    ActiveSelector,
    SimpleParallel,
    ServiceParallel,
    Join,
    Inverter,
    AlwaysSuccess,
    AlwaysFail,
    AlwaysRunning,
    OnlyOnce,
    Repeat,
    UntilSuccess,
    UntilFail,
    UntilCond,
    AlwaysCheckGuard,
    SubtreeRef,
    StateMachine,
}

impl TaskType {
    /// Returns `true` for kinds holding a child list.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            TaskType::Sequence
                | TaskType::Selector
                | TaskType::SelectorN
                | TaskType::Foreach
                | TaskType::Switch
                | TaskType::ActiveSelector
                | TaskType::SimpleParallel
                | TaskType::ServiceParallel
                | TaskType::Join
        )
    }

    /// Returns `true` for kinds wrapping a single child.
    pub fn is_decorator(self) -> bool {
        !self.is_branch() && !matches!(self, TaskType::Leaf | TaskType::StateMachine)
    }

    /// Returns `true` for the decorators that re-run their child.
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            TaskType::Repeat | TaskType::UntilSuccess | TaskType::UntilFail | TaskType::UntilCond
        )
    }
}

pub(crate) enum TaskKind<B> {
    Leaf(Box<dyn Action<B>>),
    Decorator(Decorator),
    Branch(Branch),
    StateMachine(StateMachine<B>),
}

impl<B> TaskKind<B> {
    pub(crate) fn task_type(&self) -> TaskType {
        match self {
            TaskKind::Leaf(_) => TaskType::Leaf,
            TaskKind::Decorator(decorator) => decorator.kind.task_type(),
            TaskKind::Branch(branch) => branch.kind.task_type(),
            TaskKind::StateMachine(_) => TaskType::StateMachine,
        }
    }

    /// Clears per-run state. `restarting` is set when the task leaves a
    /// completed status rather than `New`.
    pub(crate) fn reset_transient(&mut self, restarting: bool) {
        match self {
            TaskKind::Leaf(action) => {
                if restarting {
                    action.reset_for_restart();
                }
            }
            TaskKind::Decorator(decorator) => decorator.reset_transient(),
            TaskKind::Branch(branch) => branch.reset_transient(),
            TaskKind::StateMachine(fsm) => fsm.reset_transient(),
        }
    }
}

pub(crate) struct Node<B> {
    pub(crate) core: TaskCore,
    pub(crate) kind: TaskKind<B>,
}

/// Arena owning the tasks of one tree.
pub struct TaskTree<B> {
    nodes: Vec<Node<B>>,
    config: TreeConfig,
}

impl<B> TaskTree<B> {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            nodes: Vec::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of tasks in the arena, attached or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, kind: TaskKind<B>) -> TaskId {
        let id = TaskId::from_index(self.nodes.len());
        self.nodes.push(Node {
            core: TaskCore::new(),
            kind,
        });
        id
    }

    #[inline]
    pub(crate) fn node(&self, id: TaskId) -> &Node<B> {
        let len = self.nodes.len();
        self.nodes
            .get(id.index())
            .unwrap_or_else(|| panic!("task {id} out of range for tree of {len} tasks"))
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: TaskId) -> &mut Node<B> {
        let len = self.nodes.len();
        self.nodes
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("task {id} out of range for tree of {len} tasks"))
    }

    #[inline]
    pub(crate) fn core(&self, id: TaskId) -> &TaskCore {
        &self.node(id).core
    }

    #[inline]
    pub(crate) fn core_mut(&mut self, id: TaskId) -> &mut TaskCore {
        &mut self.node_mut(id).core
    }

    pub(crate) fn branch(&self, id: TaskId) -> &Branch {
        match &self.node(id).kind {
            TaskKind::Branch(branch) => branch,
            _ => panic!("task {id} is not a branch"),
        }
    }

    pub(crate) fn branch_mut(&mut self, id: TaskId) -> &mut Branch {
        match &mut self.node_mut(id).kind {
            TaskKind::Branch(branch) => branch,
            _ => panic!("task {id} is not a branch"),
        }
    }

    pub(crate) fn decorator(&self, id: TaskId) -> &Decorator {
        match &self.node(id).kind {
            TaskKind::Decorator(decorator) => decorator,
            _ => panic!("task {id} is not a decorator"),
        }
    }

    pub(crate) fn decorator_mut(&mut self, id: TaskId) -> &mut Decorator {
        match &mut self.node_mut(id).kind {
            TaskKind::Decorator(decorator) => decorator,
            _ => panic!("task {id} is not a decorator"),
        }
    }

    pub(crate) fn fsm(&self, id: TaskId) -> &StateMachine<B> {
        match &self.node(id).kind {
            TaskKind::StateMachine(fsm) => fsm,
            _ => panic!("task {id} is not a state machine"),
        }
    }

    pub(crate) fn fsm_mut(&mut self, id: TaskId) -> &mut StateMachine<B> {
        match &mut self.node_mut(id).kind {
            TaskKind::StateMachine(fsm) => fsm,
            _ => panic!("task {id} is not a state machine"),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[inline]
    pub fn task_type(&self, id: TaskId) -> TaskType {
        self.node(id).kind.task_type()
    }

    #[inline]
    pub fn status(&self, id: TaskId) -> Status {
        self.core(id).status
    }

    /// Status held before the task was last entered or reset, with failure
    /// codes clamped to [`codes::MAX_PREV_STATUS`](crate::codes::MAX_PREV_STATUS).
    #[inline]
    pub fn prev_status(&self, id: TaskId) -> Status {
        self.core(id).prev_status()
    }

    #[inline]
    pub fn is_running(&self, id: TaskId) -> bool {
        self.core(id).is_running()
    }

    #[inline]
    pub fn reentry_id(&self, id: TaskId) -> u32 {
        self.core(id).reentry_id
    }

    /// Returns `true` if the task left `Running` or was re-entered since
    /// `reentry_id` was captured.
    #[inline]
    pub fn is_exited(&self, id: TaskId, reentry_id: u32) -> bool {
        let core = self.core(id);
        core.reentry_id != reentry_id || !core.is_running()
    }

    /// The controller currently driving this task, if any.
    #[inline]
    pub fn control(&self, id: TaskId) -> Option<TaskId> {
        self.core(id).control
    }

    #[inline]
    pub fn guard(&self, id: TaskId) -> Option<TaskId> {
        self.core(id).guard
    }

    #[inline]
    pub fn cancel_token(&self, id: TaskId) -> &CancelToken {
        &self.core(id).cancel_token
    }

    #[inline]
    pub fn enter_frame(&self, id: TaskId) -> u64 {
        self.core(id).enter_frame
    }

    #[inline]
    pub fn exit_frame(&self, id: TaskId) -> u64 {
        self.core(id).exit_frame
    }

    pub fn name(&self, id: TaskId) -> Option<&str> {
        self.core(id).name.as_deref()
    }

    /// First task carrying `name`, in creation order.
    pub fn find_by_name(&self, name: &str) -> Option<TaskId> {
        self.nodes
            .iter()
            .position(|node| node.core.name.as_deref() == Some(name))
            .map(TaskId::from_index)
    }

    /// Task ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + use<B> {
        (0..self.nodes.len()).map(TaskId::from_index)
    }

    /// Live children of a branch, in registration order.
    pub fn children(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.branch(id).children.iter().copied()
    }

    /// Number of live children of a branch.
    pub fn child_count(&self, id: TaskId) -> usize {
        self.branch(id).children.real_size()
    }

    /// Child at `index` of a branch, or `None` for a removed slot.
    pub fn child_at(&self, id: TaskId, index: usize) -> Option<TaskId> {
        self.branch(id).children.get(index).copied()
    }

    /// Index of `child` among a branch's children.
    pub fn index_of_child(&self, id: TaskId, child: TaskId) -> Option<usize> {
        self.branch(id).children.index_of(&child)
    }

    /// The child wrapped by a decorator.
    pub fn decorated(&self, id: TaskId) -> Option<TaskId> {
        self.decorator(id).child
    }

    /// States registered on a state machine.
    pub fn states(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.fsm(id).states.iter().copied()
    }

    /// Current state of a state machine.
    pub fn current_state(&self, id: TaskId) -> Option<TaskId> {
        self.fsm(id).current
    }

    /// Undo history of a state machine, oldest first.
    pub fn undo_history(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.fsm(id).undo.iter().copied()
    }

    /// Redo history of a state machine, next redo target first.
    pub fn redo_history(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.fsm(id).redo.iter().copied()
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn set_name(&mut self, id: TaskId, name: impl Into<String>) {
        self.core_mut(id).name = Some(name.into());
    }

    /// Installs (or removes) the guard gating `id`.
    ///
    /// A guard is evaluated in isolation: it is never attached to a
    /// controller and its completion is not reported to anyone.
    pub fn set_guard(&mut self, id: TaskId, guard: Option<TaskId>) {
        if let Some(guard) = guard {
            assert_ne!(guard, id, "task {id} cannot guard itself");
            self.core_mut(guard).control = None;
        }
        self.core_mut(id).guard = guard;
    }

    /// Appends a child to a branch. Allowed while the branch is iterating.
    pub fn add_child(&mut self, parent: TaskId, child: TaskId) {
        assert_ne!(parent, child, "task {parent} cannot be its own child");
        self.branch_mut(parent).children.push(child);
        self.core_mut(child).control = Some(parent);
    }

    /// Inserts a child into a branch.
    ///
    /// # Panics
    ///
    /// Panics while the branch is iterating its children.
    pub fn insert_child(&mut self, parent: TaskId, index: usize, child: TaskId) {
        assert_ne!(parent, child, "task {parent} cannot be its own child");
        self.branch_mut(parent).children.insert(index, child);
        self.core_mut(child).control = Some(parent);
    }

    /// Detaches the child at `index` from a branch.
    ///
    /// While the branch is walking its children the slot is only cleared, and
    /// the list compacts once the walk unwinds.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the child is running.
    pub fn remove_child(&mut self, parent: TaskId, index: usize) -> Option<TaskId> {
        if let Some(child) = self.branch(parent).children.get(index).copied() {
            assert!(
                !self.is_running(child),
                "task {child} must be stopped before it is detached"
            );
        }
        let removed = self.branch_mut(parent).children.remove_at(index);
        if let Some(child) = removed {
            self.core_mut(child).control = None;
        }
        removed
    }

    /// Detaches `child` from a branch. Returns `false` if it is not a child.
    pub fn remove_child_task(&mut self, parent: TaskId, child: TaskId) -> bool {
        match self.index_of_child(parent, child) {
            Some(index) => self.remove_child(parent, index).is_some(),
            None => false,
        }
    }

    /// Detaches every child of a branch.
    ///
    /// # Panics
    ///
    /// Panics if any child is running.
    pub fn clear_children(&mut self, parent: TaskId) {
        let children: Vec<TaskId> = self.children(parent).collect();
        for &child in &children {
            assert!(
                !self.is_running(child),
                "task {child} must be stopped before it is detached"
            );
        }
        self.branch_mut(parent).children.clear();
        for child in children {
            self.core_mut(child).control = None;
        }
    }

    /// Replaces the child of a decorator.
    ///
    /// # Panics
    ///
    /// Panics if the current child is running.
    pub fn set_decorated(&mut self, id: TaskId, child: Option<TaskId>) {
        if let Some(previous) = self.decorator(id).child {
            assert!(
                !self.is_running(previous),
                "task {previous} must be stopped before it is detached"
            );
            self.core_mut(previous).control = None;
        }
        if let Some(child) = child {
            self.core_mut(child).control = Some(id);
        }
        self.decorator_mut(id).child = child;
    }

    /// Bounds the number of child runs a loop decorator performs per tick.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a loop decorator.
    pub fn set_max_loop_per_frame(&mut self, id: TaskId, max_loop_per_frame: u32) {
        assert!(
            self.task_type(id).is_loop(),
            "task {id} is not a loop decorator"
        );
        self.decorator_mut(id).max_loop_per_frame = max_loop_per_frame.max(1);
    }

    pub fn set_initial_state(&mut self, id: TaskId, state: Option<TaskId>) {
        if let Some(state) = state {
            self.add_state(id, state);
        }
        self.fsm_mut(id).initial = state;
    }

    /// Bounds the undo and redo histories of a state machine.
    pub fn set_history_capacity(&mut self, id: TaskId, capacity: usize) {
        let fsm = self.fsm_mut(id);
        fsm.history_capacity = capacity;
        fsm.truncate_histories();
    }

    /// Result a state machine reports while it has no current state.
    /// `Status::Running` keeps it waiting for a state change.
    pub fn set_no_state_result(&mut self, id: TaskId, result: Status) {
        assert!(
            result != Status::New,
            "no-state result of task {id} cannot be New"
        );
        self.fsm_mut(id).no_state_result = result;
    }

    /// Installs the hook invoked after every state change.
    pub fn set_state_handler(
        &mut self,
        id: TaskId,
        handler: impl StateMachineHandler<B> + 'static,
    ) {
        self.fsm_mut(id).handler = Some(Box::new(handler));
    }

    // ------------------------------------------------------------------
    // Restart
    // ------------------------------------------------------------------

    /// Returns a completed task and its whole subtree to `New`, clearing run
    /// state while keeping configuration (children, guards, policies).
    ///
    /// # Panics
    ///
    /// Panics if the task is running. Stop it first.
    pub fn reset_for_restart(&mut self, id: TaskId) {
        assert!(
            !self.is_running(id),
            "task {id} cannot be reset while running"
        );
        let node = self.node_mut(id);
        let mut related = Vec::new();
        related.extend(node.core.guard);
        match &mut node.kind {
            TaskKind::Leaf(_) => {}
            TaskKind::Decorator(decorator) => {
                related.extend(decorator.child);
                if let DecoratorKind::UntilCond { cond } = decorator.kind {
                    related.push(cond);
                }
            }
            TaskKind::Branch(branch) => related.extend(branch.children.iter().copied()),
            TaskKind::StateMachine(fsm) => {
                related.extend(fsm.initial);
                related.extend(fsm.states.iter().copied());
                related.extend(fsm.current.take());
                related.extend(fsm.undo.drain(..));
                related.extend(fsm.redo.drain(..));
                fsm.pending = None;
            }
        }
        let restarting = node.core.status != Status::New;
        node.core.remember_status();
        node.core.status = Status::New;
        node.kind.reset_transient(restarting);

        related.sort_unstable();
        related.dedup();
        for task in related {
            if task != id && !self.is_running(task) {
                self.reset_for_restart(task);
            }
        }
    }

    /// Kinds whose controller shares its cancel token with the children it
    /// runs.
    pub(crate) fn shares_token(&self, id: TaskId) -> bool {
        !matches!(
            &self.node(id).kind,
            TaskKind::Branch(Branch {
                kind: BranchKind::Join(_),
                ..
            })
        )
    }
}

impl<B> Default for TaskTree<B> {
    fn default() -> Self {
        Self::new()
    }
}
