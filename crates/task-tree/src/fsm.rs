//! State machine node.
//!
//! A state machine runs a single current state task. Changes are queued as a
//! pending [`StateChange`] and applied at well-defined points: when the
//! machine is ticked, or immediately if the request arrives while the machine
//! is idle between ticks (e.g. from an event handler).
//!
//! # History
//!
//! Leaving a state through a regular change pushes it on the undo history and
//! clears the redo history. Undo moves the outgoing state to the front of the
//! redo history, redo moves it back onto the undo history. Both histories are
//! bounded; the entry furthest from the current state is dropped on overflow.

use std::collections::VecDeque;

use crate::scheduler::Scheduler;
use crate::{Status, TaskId, TreeConfig};

/// A requested transition of a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// Switch to the given state.
    Enter(TaskId),
    /// Leave the current state without entering another.
    Clear,
    /// Return to the most recent state in the undo history.
    Undo,
    /// Return to the next state in the redo history.
    Redo,
}

/// Hook invoked after every applied state change.
///
/// The hook may answer with a follow-up change, which is applied right after
/// in the same loop rather than recursively.
pub trait StateMachineHandler<B>: Send {
    fn on_state_changed(
        &mut self,
        blackboard: &mut B,
        previous: Option<TaskId>,
        current: Option<TaskId>,
    ) -> Option<StateChange>;
}

impl<B, F> StateMachineHandler<B> for F
where
    F: FnMut(&mut B, Option<TaskId>, Option<TaskId>) -> Option<StateChange> + Send,
{
    fn on_state_changed(
        &mut self,
        blackboard: &mut B,
        previous: Option<TaskId>,
        current: Option<TaskId>,
    ) -> Option<StateChange> {
        self(blackboard, previous, current)
    }
}

pub(crate) struct StateMachine<B> {
    pub(crate) initial: Option<TaskId>,
    /// Every state known to the machine, reset along with it.
    pub(crate) states: Vec<TaskId>,
    pub(crate) history_capacity: usize,
    pub(crate) no_state_result: Status,
    pub(crate) handler: Option<Box<dyn StateMachineHandler<B>>>,

    pub(crate) current: Option<TaskId>,
    pub(crate) pending: Option<StateChange>,
    pub(crate) undo: VecDeque<TaskId>,
    pub(crate) redo: VecDeque<TaskId>,
}

impl<B> StateMachine<B> {
    pub(crate) fn new(config: &TreeConfig) -> Self {
        Self {
            initial: None,
            states: Vec::new(),
            history_capacity: config.history_capacity,
            no_state_result: config.no_state_result,
            handler: None,
            current: None,
            pending: None,
            undo: VecDeque::new(),
            redo: VecDeque::new(),
        }
    }

    /// Clears run state. A pending change survives so that requests made
    /// before the machine starts are honored.
    pub(crate) fn reset_transient(&mut self) {
        self.current = None;
        self.undo.clear();
        self.redo.clear();
    }

    pub(crate) fn truncate_histories(&mut self) {
        while self.undo.len() > self.history_capacity {
            self.undo.pop_front();
        }
        self.redo.truncate(self.history_capacity);
    }

    fn push_undo(&mut self, state: TaskId) {
        if self.history_capacity == 0 {
            return;
        }
        if self.undo.len() >= self.history_capacity {
            self.undo.pop_front();
        }
        self.undo.push_back(state);
    }

    fn push_redo(&mut self, state: TaskId) {
        if self.history_capacity == 0 {
            return;
        }
        if self.redo.len() >= self.history_capacity {
            self.redo.pop_back();
        }
        self.redo.push_front(state);
    }

    /// Resolves a change against the histories. `None` means the change is a
    /// no-op because the requested history is empty.
    fn target(&mut self, change: StateChange) -> Option<Option<TaskId>> {
        match change {
            StateChange::Enter(state) => Some(Some(state)),
            StateChange::Clear => Some(None),
            StateChange::Undo => self.undo.pop_back().map(Some),
            StateChange::Redo => self.redo.pop_front().map(Some),
        }
    }

    fn record(&mut self, change: StateChange, previous: Option<TaskId>) {
        match change {
            StateChange::Undo => {
                if let Some(previous) = previous {
                    self.push_redo(previous);
                }
            }
            StateChange::Redo => {
                if let Some(previous) = previous {
                    self.push_undo(previous);
                }
            }
            StateChange::Enter(_) | StateChange::Clear => {
                if let Some(previous) = previous {
                    self.push_undo(previous);
                }
                self.redo.clear();
            }
        }
    }
}

impl<B> Scheduler<'_, B> {
    pub(crate) fn enter_state_machine(&mut self, id: TaskId) {
        let fsm = self.tree.fsm_mut(id);
        if fsm.pending.is_none() {
            fsm.pending = fsm.initial.map(StateChange::Enter);
        }
    }

    pub(crate) fn execute_state_machine(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        self.apply_pending(id);
        if self.tree.is_exited(id, reentry_id) {
            return;
        }

        let fsm = self.tree.fsm(id);
        let Some(state) = fsm.current else {
            let result = fsm.no_state_result;
            if result.is_completed() {
                self.set_completed(id, result);
            }
            return;
        };

        self.run_child(id, state);
        if self.check_cancel(id, reentry_id) {
            return;
        }
        // A change requested while the state ran takes effect now; the new
        // state first runs on the next tick.
        if self.tree.fsm(id).pending.is_some() {
            self.apply_pending(id);
        }
    }

    /// Applies queued changes until none is left or the machine exits.
    fn apply_pending(&mut self, id: TaskId) {
        let reentry_id = self.reentry_id(id);
        while let Some(change) = self.tree.fsm_mut(id).pending.take() {
            let fsm = self.tree.fsm_mut(id);
            let previous = fsm.current;
            let Some(next) = fsm.target(change) else {
                tracing::debug!(task = %id, ?change, "state history empty");
                continue;
            };

            if let Some(previous) = previous {
                self.stop(previous);
            }
            let fsm = self.tree.fsm_mut(id);
            fsm.record(change, previous);
            fsm.current = next;
            if let Some(next) = next {
                self.tree.core_mut(next).control = Some(id);
            }
            tracing::debug!(task = %id, ?previous, ?next, ?change, "state changed");

            let Scheduler {
                tree, blackboard, ..
            } = self;
            let follow_up = tree
                .fsm_mut(id)
                .handler
                .as_mut()
                .and_then(|handler| handler.on_state_changed(blackboard, previous, next));
            if let Some(follow_up) = follow_up {
                self.tree.fsm_mut(id).pending = Some(follow_up);
            }
            if self.tree.is_exited(id, reentry_id) {
                return;
            }
        }
    }

    pub(crate) fn state_completed(&mut self, id: TaskId, state: TaskId) {
        let fsm = self.tree.fsm(id);
        if fsm.current != Some(state) {
            return;
        }
        if fsm.pending.is_some() {
            if !self.is_executing(id) {
                self.template_execute(id, false);
            }
            return;
        }
        let status = self.status(state).outward();
        self.set_completed(id, status);
    }

    /// Queues a change on a state machine, applying it right away if the
    /// machine is running but not in the middle of a tick.
    pub(crate) fn request_state_change(&mut self, id: TaskId, change: StateChange) {
        self.tree.fsm_mut(id).pending = Some(change);
        if self.is_running(id) && !self.is_executing(id) {
            self.template_execute(id, false);
        }
    }
}
