//! Decorator nodes.
//!
//! Decorators wrap a single child and transform its result or re-drive it.
//! Loop decorators (`Repeat`, `UntilSuccess`, `UntilFail`, `UntilCond`) run
//! their child at most `max_loop_per_frame` times per tick; a child that
//! completes outside of the decorator's own tick is only re-entered on the
//! next tick.

use crate::scheduler::Scheduler;
use crate::tree::TaskType;
use crate::{Status, TaskId, codes};

/// Which child outcomes a `Repeat` counts towards its required total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RepeatMode {
    /// Every completion counts.
    #[default]
    Always,
    OnlySuccess,
    OnlyFailure,
    /// Nothing counts; the child repeats until the decorator is stopped.
    Never,
}

impl RepeatMode {
    pub fn counts(self, status: Status) -> bool {
        match self {
            RepeatMode::Always => true,
            RepeatMode::OnlySuccess => status.is_success(),
            RepeatMode::OnlyFailure => status.is_failure(),
            RepeatMode::Never => false,
        }
    }
}

pub(crate) enum DecoratorKind {
    Inverter,
    AlwaysSuccess,
    AlwaysFail,
    AlwaysRunning,
    OnlyOnce,
    Repeat { mode: RepeatMode, required: u32 },
    UntilSuccess,
    UntilFail,
    /// Repeats until `cond` succeeds after a child completion.
    UntilCond { cond: TaskId },
    AlwaysCheckGuard,
    /// Resolves the named subtree on first entry.
    SubtreeRef { name: String },
}

impl DecoratorKind {
    pub(crate) fn task_type(&self) -> TaskType {
        match self {
            DecoratorKind::Inverter => TaskType::Inverter,
            DecoratorKind::AlwaysSuccess => TaskType::AlwaysSuccess,
            DecoratorKind::AlwaysFail => TaskType::AlwaysFail,
            DecoratorKind::AlwaysRunning => TaskType::AlwaysRunning,
            DecoratorKind::OnlyOnce => TaskType::OnlyOnce,
            DecoratorKind::Repeat { .. } => TaskType::Repeat,
            DecoratorKind::UntilSuccess => TaskType::UntilSuccess,
            DecoratorKind::UntilFail => TaskType::UntilFail,
            DecoratorKind::UntilCond { .. } => TaskType::UntilCond,
            DecoratorKind::AlwaysCheckGuard => TaskType::AlwaysCheckGuard,
            DecoratorKind::SubtreeRef { .. } => TaskType::SubtreeRef,
        }
    }
}

pub(crate) struct Decorator {
    pub(crate) child: Option<TaskId>,
    pub(crate) kind: DecoratorKind,
    pub(crate) max_loop_per_frame: u32,
    /// Whether `AlwaysRunning` already started its child in this run.
    pub(crate) started: bool,
    /// Counted completions of a `Repeat` in this run.
    pub(crate) count: u32,
}

impl Decorator {
    pub(crate) fn new(kind: DecoratorKind, child: Option<TaskId>, max_loop_per_frame: u32) -> Self {
        Self {
            child,
            kind,
            max_loop_per_frame: max_loop_per_frame.max(1),
            started: false,
            count: 0,
        }
    }

    pub(crate) fn reset_transient(&mut self) {
        self.started = false;
        self.count = 0;
    }
}

impl<B> Scheduler<'_, B> {
    fn decorated_child(&self, id: TaskId) -> TaskId {
        self.tree
            .decorator(id)
            .child
            .unwrap_or_else(|| panic!("decorator {id} has no child"))
    }

    pub(crate) fn enter_decorator(&mut self, id: TaskId) {
        match &self.tree.decorator(id).kind {
            DecoratorKind::AlwaysRunning => {}
            DecoratorKind::SubtreeRef { name } => {
                if self.tree.decorator(id).child.is_none() {
                    let name = name.clone();
                    self.load_subtree(id, &name);
                }
            }
            DecoratorKind::Repeat { required: 0, .. } => {
                self.decorated_child(id);
                self.set_success(id);
            }
            DecoratorKind::OnlyOnce => {
                let child = self.decorated_child(id);
                let status = self.status(child);
                if status.is_completed() {
                    tracing::trace!(task = %id, ?status, "replaying cached status");
                    self.set_completed(id, status.outward());
                }
            }
            _ => {
                self.decorated_child(id);
            }
        }
    }

    fn load_subtree(&mut self, id: TaskId, name: &str) {
        let Scheduler { tree, loader, .. } = self;
        match loader.load_root_task(name, tree) {
            Ok(root) => {
                tracing::debug!(task = %id, subtree = name, root = %root, "subtree loaded");
                self.tree.set_decorated(id, Some(root));
            }
            Err(err) => {
                tracing::warn!(task = %id, subtree = name, error = %err, "subtree load failed");
                self.set_failed(id, codes::SUBTREE_LOAD_FAILED);
            }
        }
    }

    pub(crate) fn execute_decorator(&mut self, id: TaskId) {
        let ty = self.task_type(id);
        if ty.is_loop() {
            self.execute_loop(id);
            return;
        }

        let reentry_id = self.reentry_id(id);
        match ty {
            TaskType::AlwaysRunning => {
                let decorator = self.tree.decorator(id);
                let Some(child) = decorator.child else {
                    return;
                };
                if decorator.started && !self.is_running(child) {
                    return;
                }
                self.tree.decorator_mut(id).started = true;
                self.run_child(id, child);
            }
            TaskType::AlwaysCheckGuard => {
                let child = self.decorated_child(id);
                if self.is_running(child)
                    && let Some(guard) = self.tree.guard(child)
                {
                    let passed = self.check_guard(guard);
                    if self.check_cancel(id, reentry_id) {
                        return;
                    }
                    if !passed {
                        tracing::trace!(task = %id, child = %child, "guard no longer passes");
                        self.stop(child);
                        self.set_completed(id, Status::GuardFailed);
                        return;
                    }
                }
                self.run_child(id, child);
            }
            _ => {
                let child = self.decorated_child(id);
                self.run_child(id, child);
            }
        }
        self.check_cancel(id, reentry_id);
    }

    fn execute_loop(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        let child = self.decorated_child(id);
        let max_loop_per_frame = self.tree.decorator(id).max_loop_per_frame;
        for _ in 0..max_loop_per_frame {
            self.run_child(id, child);
            if self.check_cancel(id, reentry_id) || self.is_running(child) {
                return;
            }
        }
    }

    pub(crate) fn decorator_child_completed(&mut self, id: TaskId, child: TaskId) {
        if self.tree.decorator(id).child != Some(child) {
            return;
        }
        let status = self.status(child);
        let result = match self.task_type(id) {
            TaskType::Inverter => Some(status.invert()),
            TaskType::AlwaysSuccess if status.is_cancelled() => Some(Status::Cancelled),
            TaskType::AlwaysSuccess => Some(Status::Success),
            TaskType::AlwaysFail if status.is_success() => Some(Status::ERROR),
            TaskType::AlwaysFail => Some(status.outward()),
            TaskType::AlwaysRunning => status.is_cancelled().then_some(Status::Cancelled),
            TaskType::AlwaysCheckGuard => Some(status),
            TaskType::OnlyOnce | TaskType::SubtreeRef => Some(status.outward()),
            _ => return self.loop_child_completed(id, child, status),
        };
        if let Some(result) = result {
            self.set_completed(id, result);
        }
    }

    fn loop_child_completed(&mut self, id: TaskId, child: TaskId, status: Status) {
        if status.is_cancelled() {
            self.set_cancelled(id);
            return;
        }

        let reentry_id = self.reentry_id(id);
        let done = match self.tree.decorator(id).kind {
            DecoratorKind::Repeat { mode, required } => {
                let decorator = self.tree.decorator_mut(id);
                if mode.counts(status) {
                    decorator.count += 1;
                }
                decorator.count >= required
            }
            DecoratorKind::UntilSuccess => status.is_success(),
            DecoratorKind::UntilFail => status.is_failure(),
            DecoratorKind::UntilCond { cond } => {
                let passed = self.check_guard(cond);
                if self.tree.is_exited(id, reentry_id) {
                    return;
                }
                passed
            }
            _ => unreachable!("task {id} is not a loop decorator"),
        };

        if done {
            let result = if self.task_type(id) == TaskType::UntilCond {
                status.outward()
            } else {
                Status::Success
            };
            tracing::trace!(task = %id, child = %child, ?result, "loop finished");
            self.set_completed(id, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_mode_counts() {
        assert!(RepeatMode::Always.counts(Status::ERROR));
        assert!(RepeatMode::OnlySuccess.counts(Status::Success));
        assert!(!RepeatMode::OnlySuccess.counts(Status::ERROR));
        assert!(RepeatMode::OnlyFailure.counts(Status::GuardFailed));
        assert!(!RepeatMode::Never.counts(Status::Success));
    }

    #[test]
    fn loop_bound_never_zero() {
        let decorator = Decorator::new(DecoratorKind::UntilSuccess, None, 0);
        assert_eq!(decorator.max_loop_per_frame, 1);
    }
}
