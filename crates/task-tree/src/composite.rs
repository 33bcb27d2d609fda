//! Branch nodes.
//!
//! A branch owns an ordered child list and a composition policy
//! ([`BranchKind`]). The sequential family ([`Sequence`](BranchKind::Sequence),
//! [`Selector`](BranchKind::Selector), [`SelectorN`](BranchKind::SelectorN),
//! [`Foreach`](BranchKind::Foreach)) and the guard-driven selectors live here;
//! the parallel kinds are in `parallel` and [`join`](crate::join).

use std::any::Any;

use crate::join::JoinPolicy;
use crate::scheduler::Scheduler;
use crate::tree::TaskType;
use crate::{DelayedCompressList, Result, Status, TaskId};

/// Composition policy of a branch.
pub(crate) enum BranchKind {
    /// AND: fails with the first failing child.
    Sequence,
    /// OR: succeeds with the first succeeding child.
    Selector,
    /// Succeeds once `required` children succeeded. `0` succeeds on entry.
    SelectorN { required: u32 },
    /// Runs every child whatever its outcome.
    Foreach,
    /// Commits to the first child whose guard passes.
    Switch,
    /// Re-selects by guard every tick, preempting the running child.
    ActiveSelector,
    SimpleParallel,
    ServiceParallel,
    Join(Box<dyn JoinPolicy>),
}

impl BranchKind {
    pub(crate) fn task_type(&self) -> TaskType {
        match self {
            BranchKind::Sequence => TaskType::Sequence,
            BranchKind::Selector => TaskType::Selector,
            BranchKind::SelectorN { .. } => TaskType::SelectorN,
            BranchKind::Foreach => TaskType::Foreach,
            BranchKind::Switch => TaskType::Switch,
            BranchKind::ActiveSelector => TaskType::ActiveSelector,
            BranchKind::SimpleParallel => TaskType::SimpleParallel,
            BranchKind::ServiceParallel => TaskType::ServiceParallel,
            BranchKind::Join(_) => TaskType::Join,
        }
    }

    /// Completion rule of the sequential family once a child exited with
    /// `status`. `None` continues with the next child.
    fn on_child_status(&self, status: Status, succeeded: usize, exhausted: bool) -> Option<Status> {
        if status.is_cancelled() {
            return Some(Status::Cancelled);
        }
        match self {
            BranchKind::Sequence if status.is_failure() => Some(status.outward()),
            BranchKind::Selector if status.is_success() => Some(Status::Success),
            BranchKind::Selector if exhausted => Some(status.outward()),
            BranchKind::SelectorN { required } if succeeded >= *required as usize => {
                Some(Status::Success)
            }
            _ if exhausted => Some(self.on_exhausted(succeeded)),
            _ => None,
        }
    }

    /// Result of the sequential family when no child is left to run.
    fn on_exhausted(&self, succeeded: usize) -> Status {
        match self {
            BranchKind::Sequence | BranchKind::Foreach => Status::Success,
            BranchKind::SelectorN { required } if succeeded >= *required as usize => {
                Status::Success
            }
            _ => Status::ERROR,
        }
    }
}

pub(crate) struct Branch {
    pub(crate) children: DelayedCompressList<TaskId>,
    pub(crate) kind: BranchKind,
    /// Child currently driven by a sequential or selecting branch.
    pub(crate) running: Option<TaskId>,
    /// Slot of the next child a sequential branch runs.
    pub(crate) cursor: usize,
    pub(crate) completed: usize,
    pub(crate) succeeded: usize,
    /// Reentry id of each child captured when the current run started.
    pub(crate) entry_ids: Vec<(TaskId, u32)>,
}

impl Branch {
    pub(crate) fn new(kind: BranchKind, children: impl IntoIterator<Item = TaskId>) -> Self {
        Self {
            children: children.into_iter().collect(),
            kind,
            running: None,
            cursor: 0,
            completed: 0,
            succeeded: 0,
            entry_ids: Vec::new(),
        }
    }

    pub(crate) fn reset_transient(&mut self) {
        self.running = None;
        self.cursor = 0;
        self.completed = 0;
        self.succeeded = 0;
        self.entry_ids.clear();
        if let BranchKind::Join(policy) = &mut self.kind {
            policy.reset_for_restart();
        }
    }

    pub(crate) fn entry_id(&self, child: TaskId) -> Option<u32> {
        self.entry_ids
            .iter()
            .find_map(|&(task, entry_id)| (task == child).then_some(entry_id))
    }

    /// Records a child's outcome in the run counters.
    pub(crate) fn count(&mut self, status: Status) {
        self.completed += 1;
        if status.is_success() {
            self.succeeded += 1;
        }
    }

    /// First live slot at or after `cursor`.
    fn next_live(&self, mut cursor: usize) -> Option<(usize, TaskId)> {
        while cursor < self.children.len() {
            if let Some(&child) = self.children.get(cursor) {
                return Some((cursor, child));
            }
            cursor += 1;
        }
        None
    }
}

impl<B> Scheduler<'_, B> {
    pub(crate) fn enter_branch(&mut self, id: TaskId) {
        match self.task_type(id) {
            TaskType::Sequence | TaskType::Selector | TaskType::SelectorN | TaskType::Foreach => {
                self.enter_sequential(id)
            }
            TaskType::Switch | TaskType::ActiveSelector => {
                if self.tree.child_count(id) == 0 {
                    self.set_failed(id, crate::codes::ERROR);
                }
            }
            TaskType::SimpleParallel | TaskType::ServiceParallel => self.enter_parallel(id),
            TaskType::Join => self.enter_join(id),
            other => unreachable!("{other:?} is not a branch"),
        }
    }

    pub(crate) fn execute_branch(&mut self, id: TaskId) {
        match self.task_type(id) {
            TaskType::Sequence | TaskType::Selector | TaskType::SelectorN | TaskType::Foreach => {
                self.execute_sequential(id)
            }
            TaskType::Switch => self.execute_switch(id),
            TaskType::ActiveSelector => self.execute_active_selector(id),
            TaskType::SimpleParallel => self.execute_simple_parallel(id),
            TaskType::ServiceParallel => self.execute_service_parallel(id),
            TaskType::Join => self.execute_join(id),
            other => unreachable!("{other:?} is not a branch"),
        }
    }

    pub(crate) fn branch_child_completed(&mut self, id: TaskId, child: TaskId) {
        match self.task_type(id) {
            TaskType::Sequence | TaskType::Selector | TaskType::SelectorN | TaskType::Foreach => {
                self.sequential_child_completed(id, child)
            }
            TaskType::Switch | TaskType::ActiveSelector => {
                if self.tree.branch(id).running == Some(child) {
                    let status = self.status(child).outward();
                    self.set_completed(id, status);
                }
            }
            TaskType::SimpleParallel | TaskType::ServiceParallel => {
                self.parallel_child_completed(id, child)
            }
            TaskType::Join => self.join_child_completed(id, child),
            other => unreachable!("{other:?} is not a branch"),
        }
    }

    /// Drops a running branch's bookkeeping for a child detached from slot
    /// `index`. `counted` tells whether the child's completion in this run
    /// was already recorded.
    pub(crate) fn branch_child_detached(
        &mut self,
        id: TaskId,
        child: TaskId,
        index: usize,
        counted: bool,
    ) {
        let branch = self.tree.branch_mut(id);
        if branch.running == Some(child) {
            branch.running = None;
        }
        if !branch.children.is_iterating() && index < branch.cursor {
            branch.cursor -= 1;
        }
        branch.entry_ids.retain(|&(task, _)| task != child);
        if self.task_type(id) == TaskType::Join {
            self.join_child_detached(id, child, counted);
        }
    }

    pub(crate) fn branch_event(&mut self, id: TaskId, event: &dyn Any) -> Result<()> {
        let target = match self.task_type(id) {
            TaskType::Join => return self.join_event(id, event),
            TaskType::SimpleParallel | TaskType::ServiceParallel => self.tree.child_at(id, 0),
            _ => self.tree.branch(id).running,
        };
        match target {
            Some(child) => self.dispatch_event(child, event),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Sequence / Selector / SelectorN / Foreach
    // ------------------------------------------------------------------

    fn enter_sequential(&mut self, id: TaskId) {
        let branch = self.tree.branch(id);
        if let BranchKind::SelectorN { required: 0 } = branch.kind {
            self.set_success(id);
        } else if branch.children.real_size() == 0 {
            let status = branch.kind.on_exhausted(0);
            self.set_completed(id, status);
        }
    }

    fn execute_sequential(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        self.with_children_iter(id, |this| {
            let bound = this.tree.branch(id).children.len() + 1;
            for _ in 0..bound {
                let branch = this.tree.branch_mut(id);
                let child = match branch.running {
                    Some(child) => child,
                    None => match branch.next_live(branch.cursor) {
                        Some((cursor, child)) => {
                            branch.cursor = cursor;
                            branch.running = Some(child);
                            child
                        }
                        None => {
                            let status = branch.kind.on_exhausted(branch.succeeded);
                            this.set_completed(id, status);
                            return;
                        }
                    },
                };

                this.run_child(id, child);
                if this.check_cancel(id, reentry_id) || this.is_running(child) {
                    return;
                }
            }
        });
    }

    fn sequential_child_completed(&mut self, id: TaskId, child: TaskId) {
        let status = self.status(child);
        let branch = self.tree.branch_mut(id);
        if branch.running != Some(child) {
            return;
        }
        branch.running = None;
        branch.count(status);
        if let Some(index) = branch.children.index_of(&child) {
            branch.cursor = index + 1;
        }
        let exhausted = branch.next_live(branch.cursor).is_none();

        match branch.kind.on_child_status(status, branch.succeeded, exhausted) {
            Some(result) => self.set_completed(id, result),
            None if !self.is_executing(id) => {
                self.template_execute(id, false);
            }
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Switch / ActiveSelector
    // ------------------------------------------------------------------

    /// First child whose guard passes, in registration order. Children
    /// without a guard always pass.
    fn select_by_guard(&mut self, id: TaskId) -> Option<TaskId> {
        self.with_children_iter(id, |this| {
            let len = this.tree.branch(id).children.len();
            for index in 0..len {
                let Some(child) = this.tree.child_at(id, index) else {
                    continue;
                };
                match this.tree.guard(child) {
                    None => return Some(child),
                    Some(guard) if this.check_guard(guard) => return Some(child),
                    Some(_) => {}
                }
            }
            None
        })
    }

    fn execute_switch(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        let child = match self.tree.branch(id).running {
            Some(child) => child,
            None => {
                let selected = self.select_by_guard(id);
                if self.check_cancel(id, reentry_id) {
                    return;
                }
                let Some(child) = selected else {
                    self.set_failed(id, crate::codes::ERROR);
                    return;
                };
                self.tree.branch_mut(id).running = Some(child);
                child
            }
        };

        self.run_child_directly(id, child);
        self.check_cancel(id, reentry_id);
    }

    fn execute_active_selector(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        let selected = self.select_by_guard(id);
        if self.check_cancel(id, reentry_id) {
            return;
        }

        let previous = self.tree.branch(id).running;
        if previous != selected {
            if let Some(previous) = previous {
                tracing::trace!(task = %id, from = %previous, "preempting child");
                self.stop(previous);
            }
            self.tree.branch_mut(id).running = selected;
        }

        match selected {
            Some(child) => {
                self.run_child_directly(id, child);
                self.check_cancel(id, reentry_id);
            }
            None => self.set_failed(id, crate::codes::ERROR),
        }
    }
}
