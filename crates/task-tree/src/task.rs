//! Task identity and the state shared by every node kind.

use std::fmt;

use crate::{CancelToken, Status};

/// Handle of a task inside its [`TaskTree`](crate::TaskTree).
///
/// Handles are plain indices: copying one never affects ownership, which is
/// always held structurally by the tree (controllers list their children,
/// children only keep their controller's handle for navigation).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u32);

impl TaskId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("task arena exceeds u32::MAX entries"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state common to all tasks.
#[derive(Debug)]
pub(crate) struct TaskCore {
    pub(crate) status: Status,
    /// Status held before the last enter or reset, failure code clamped.
    pub(crate) prev_status: Status,
    /// Incremented exactly once per enter.
    pub(crate) reentry_id: u32,
    pub(crate) control: Option<TaskId>,
    pub(crate) guard: Option<TaskId>,
    pub(crate) cancel_token: CancelToken,
    /// Nesting depth of `execute` calls currently on the stack.
    pub(crate) executing: u16,
    pub(crate) enter_frame: u64,
    pub(crate) exit_frame: u64,
    pub(crate) name: Option<String>,
}

impl TaskCore {
    pub(crate) fn new() -> Self {
        Self {
            status: Status::New,
            prev_status: Status::New,
            reentry_id: 0,
            control: None,
            guard: None,
            cancel_token: CancelToken::new(),
            executing: 0,
            enter_frame: 0,
            exit_frame: 0,
            name: None,
        }
    }

    /// Moves the current status into the previous-status slot.
    #[inline]
    pub(crate) fn remember_status(&mut self) {
        if self.status != Status::New {
            self.prev_status = self.status.clamped();
        }
    }

    #[inline]
    pub(crate) fn prev_status(&self) -> Status {
        self.prev_status
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_status_clamps() {
        let mut core = TaskCore::new();
        core.status = Status::Failed(1000);
        core.remember_status();
        assert_eq!(
            core.prev_status(),
            Status::Failed(crate::codes::MAX_PREV_STATUS)
        );
    }

    #[test]
    fn new_status_does_not_overwrite_memory() {
        let mut core = TaskCore::new();
        core.status = Status::Success;
        core.remember_status();
        core.status = Status::New;
        core.remember_status();
        assert_eq!(core.prev_status(), Status::Success);
    }
}
