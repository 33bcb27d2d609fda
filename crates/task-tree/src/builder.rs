//! Constructors for every node kind.
//!
//! Builders allocate the node in the tree and wire the children's control
//! back-references, so trees read bottom-up:
//!
//! ```
//! use task_tree::{TaskTree, leaf::{Success, WaitFrame}};
//!
//! let mut tree: TaskTree<()> = TaskTree::new();
//! let wait = tree.leaf(WaitFrame::new(2));
//! let done = tree.leaf(Success);
//! let root = tree.sequence([wait, done]);
//! assert_eq!(tree.child_count(root), 2);
//! ```

use crate::composite::{Branch, BranchKind};
use crate::decorator::{Decorator, DecoratorKind, RepeatMode};
use crate::fsm::StateMachine;
use crate::join::JoinPolicy;
use crate::leaf::{Condition, FnAction};
use crate::tree::TaskKind;
use crate::{Action, LeafContext, Status, TaskId, TaskTree};

impl<B> TaskTree<B> {
    pub fn leaf(&mut self, action: impl Action<B> + 'static) -> TaskId {
        self.leaf_boxed(Box::new(action))
    }

    pub fn leaf_boxed(&mut self, action: Box<dyn Action<B>>) -> TaskId {
        self.push(TaskKind::Leaf(action))
    }

    /// Creates a leaf from a closure.
    pub fn action<F>(&mut self, f: F) -> TaskId
    where
        F: FnMut(&mut LeafContext<'_, B>) -> Status + Send + 'static,
    {
        self.leaf(FnAction::new(f))
    }

    /// Creates a leaf that succeeds iff `predicate` holds.
    pub fn condition<F>(&mut self, predicate: F) -> TaskId
    where
        F: FnMut(&B) -> bool + Send + 'static,
    {
        self.leaf(Condition::new(predicate))
    }

    // ------------------------------------------------------------------
    // Branches
    // ------------------------------------------------------------------

    fn branch_node(&mut self, kind: BranchKind, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        let branch = Branch::new(kind, children);
        let children: Vec<TaskId> = branch.children.iter().copied().collect();
        let id = self.push(TaskKind::Branch(branch));
        for child in children {
            assert_ne!(child, id, "task {id} cannot be its own child");
            self.core_mut(child).control = Some(id);
        }
        id
    }

    pub fn sequence(&mut self, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::Sequence, children)
    }

    pub fn selector(&mut self, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::Selector, children)
    }

    /// Succeeds once `required` children succeeded, trying them in order.
    pub fn selector_n(&mut self, required: u32, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::SelectorN { required }, children)
    }

    pub fn foreach(&mut self, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::Foreach, children)
    }

    pub fn switch(&mut self, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::Switch, children)
    }

    pub fn active_selector(&mut self, children: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::ActiveSelector, children)
    }

    /// Runs `main` and ticks `hooks` after it until `main` completes. Hooks
    /// that complete are not restarted within the same run.
    pub fn simple_parallel(&mut self, main: TaskId, hooks: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::SimpleParallel, std::iter::once(main).chain(hooks))
    }

    /// Ticks `hooks` before `main` every tick, restarting completed hooks,
    /// until `main` completes.
    pub fn service_parallel(&mut self, main: TaskId, hooks: impl IntoIterator<Item = TaskId>) -> TaskId {
        self.branch_node(BranchKind::ServiceParallel, std::iter::once(main).chain(hooks))
    }

    pub fn join(
        &mut self,
        policy: impl JoinPolicy + 'static,
        children: impl IntoIterator<Item = TaskId>,
    ) -> TaskId {
        self.join_boxed(Box::new(policy), children)
    }

    pub fn join_boxed(
        &mut self,
        policy: Box<dyn JoinPolicy>,
        children: impl IntoIterator<Item = TaskId>,
    ) -> TaskId {
        self.branch_node(BranchKind::Join(policy), children)
    }

    // ------------------------------------------------------------------
    // Decorators
    // ------------------------------------------------------------------

    fn decorator_node(&mut self, kind: DecoratorKind, child: Option<TaskId>) -> TaskId {
        let decorator = Decorator::new(kind, child, self.config().max_loop_per_frame);
        let id = self.push(TaskKind::Decorator(decorator));
        if let Some(child) = child {
            self.core_mut(child).control = Some(id);
        }
        id
    }

    pub fn inverter(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::Inverter, Some(child))
    }

    pub fn always_success(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::AlwaysSuccess, Some(child))
    }

    pub fn always_fail(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::AlwaysFail, Some(child))
    }

    /// Runs `child` once per run and then stays running. Without a child it
    /// simply never completes.
    pub fn always_running(&mut self, child: Option<TaskId>) -> TaskId {
        self.decorator_node(DecoratorKind::AlwaysRunning, child)
    }

    pub fn only_once(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::OnlyOnce, Some(child))
    }

    pub fn repeat(&mut self, mode: RepeatMode, required: u32, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::Repeat { mode, required }, Some(child))
    }

    pub fn until_success(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::UntilSuccess, Some(child))
    }

    pub fn until_fail(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::UntilFail, Some(child))
    }

    /// Repeats `child` until `cond`, evaluated after each of its completions,
    /// succeeds.
    pub fn until_cond(&mut self, cond: TaskId, child: TaskId) -> TaskId {
        assert_ne!(cond, child, "condition of task {child} cannot be the task itself");
        self.core_mut(cond).control = None;
        self.decorator_node(DecoratorKind::UntilCond { cond }, Some(child))
    }

    pub fn always_check_guard(&mut self, child: TaskId) -> TaskId {
        self.decorator_node(DecoratorKind::AlwaysCheckGuard, Some(child))
    }

    /// A reference to the subtree the entry's loader resolves for `name`.
    pub fn subtree_ref(&mut self, name: impl Into<String>) -> TaskId {
        self.decorator_node(DecoratorKind::SubtreeRef { name: name.into() }, None)
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    /// Creates a state machine over `states`, starting in `initial` when
    /// entered.
    pub fn state_machine(
        &mut self,
        states: impl IntoIterator<Item = TaskId>,
        initial: Option<TaskId>,
    ) -> TaskId {
        let mut fsm = StateMachine::new(self.config());
        fsm.states = states.into_iter().collect();
        if let Some(initial) = initial
            && !fsm.states.contains(&initial)
        {
            fsm.states.push(initial);
        }
        fsm.initial = initial;
        let states = fsm.states.clone();
        let id = self.push(TaskKind::StateMachine(fsm));
        for state in states {
            self.core_mut(state).control = Some(id);
        }
        id
    }

    /// Registers another state of a state machine.
    pub fn add_state(&mut self, fsm: TaskId, state: TaskId) {
        let machine = self.fsm_mut(fsm);
        if !machine.states.contains(&state) {
            machine.states.push(state);
        }
        self.core_mut(state).control = Some(fsm);
    }
}
