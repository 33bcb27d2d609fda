use crate::Status;

/// Defaults applied to nodes when a tree creates them.
///
/// Per-node values can be overridden afterwards through the tree, e.g.
/// [`TaskTree::set_max_loop_per_frame`](crate::TaskTree::set_max_loop_per_frame).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TreeConfig {
    /// Child runs a loop decorator may perform within one tick. Never below 1.
    pub max_loop_per_frame: u32,
    /// Bound of the undo and redo histories of state machines.
    pub history_capacity: usize,
    /// Status a state machine completes with when it has no state to run.
    pub no_state_result: Status,
}

impl TreeConfig {
    pub const DEFAULT_MAX_LOOP_PER_FRAME: u32 = 1;
    pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
    pub const DEFAULT_NO_STATE_RESULT: Status = Status::Success;

    pub fn new() -> Self {
        Self {
            max_loop_per_frame: Self::DEFAULT_MAX_LOOP_PER_FRAME,
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
            no_state_result: Self::DEFAULT_NO_STATE_RESULT,
        }
    }

    pub fn with_max_loop_per_frame(mut self, max_loop_per_frame: u32) -> Self {
        self.max_loop_per_frame = max_loop_per_frame.max(1);
        self
    }

    pub fn with_history_capacity(mut self, history_capacity: usize) -> Self {
        self.history_capacity = history_capacity;
        self
    }

    /// # Panics
    ///
    /// Panics if `result` is `Status::New`.
    pub fn with_no_state_result(mut self, result: Status) -> Self {
        assert!(result != Status::New, "no-state result cannot be New");
        self.no_state_result = result;
        self
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}
