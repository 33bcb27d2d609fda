//! Task lifecycle status.

/// Numeric status codes.
///
/// Every [`Status`] maps to a code. Codes `>= ERROR` are failures. Codes below
/// [`USER_BASE`] are reserved for the runtime; leaves report their own failure
/// reasons with codes from `USER_BASE` up, and those bubble up unchanged
/// through sequences and decorators.
pub mod codes {
    pub const NEW: u16 = 0;
    pub const RUNNING: u16 = 1;
    pub const SUCCESS: u16 = 2;
    pub const CANCELLED: u16 = 3;
    /// Default failure code.
    pub const ERROR: u16 = 4;
    pub const GUARD_FAILED: u16 = 5;
    /// A `SubtreeRef` could not resolve its subtree.
    pub const SUBTREE_LOAD_FAILED: u16 = 6;

    /// First failure code available to leaves.
    pub const USER_BASE: u16 = 16;

    /// Upper bound of the remembered previous status.
    ///
    /// Larger failure codes are clamped to this value when they are moved into
    /// the previous-status slot.
    pub const MAX_PREV_STATUS: u16 = 31;
}

/// The lifecycle state of a task.
///
/// # Lifecycle
///
/// `New -> Running -> {Success, Failed, Cancelled, GuardFailed}`. A terminal
/// task only becomes `Running` again by being re-entered by its controller or
/// after an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Status {
    /// Never entered, or reset.
    #[default]
    New,

    /// Entered and not yet completed.
    Running,

    /// Completed successfully.
    Success,

    /// Stopped before completion, either by its cancel token or by its
    /// controller.
    Cancelled,

    /// Completed with a failure code (`>= codes::ERROR`).
    Failed(u16),

    /// The task's guard rejected it before it was entered.
    GuardFailed,
}

impl Status {
    /// The default failure.
    pub const ERROR: Status = Status::Failed(codes::ERROR);

    /// Creates a failure status. Codes below [`codes::ERROR`] are raised to it.
    ///
    /// The result is always `Failed`, even for a code the runtime reserves.
    #[inline]
    pub fn failed(code: u16) -> Self {
        Status::Failed(code.max(codes::ERROR))
    }

    /// Maps a numeric code back to a status. [`codes::GUARD_FAILED`] maps to
    /// `GuardFailed`, every other failure code to `Failed`.
    pub fn from_code(code: u16) -> Self {
        match code {
            codes::NEW => Status::New,
            codes::RUNNING => Status::Running,
            codes::SUCCESS => Status::Success,
            codes::CANCELLED => Status::Cancelled,
            codes::GUARD_FAILED => Status::GuardFailed,
            code => Status::Failed(code),
        }
    }

    /// Numeric code of this status.
    pub fn code(self) -> u16 {
        match self {
            Status::New => codes::NEW,
            Status::Running => codes::RUNNING,
            Status::Success => codes::SUCCESS,
            Status::Cancelled => codes::CANCELLED,
            Status::Failed(code) => code.max(codes::ERROR),
            Status::GuardFailed => codes::GUARD_FAILED,
        }
    }

    /// Returns `true` if this status is `Running`.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Status::Running)
    }

    /// Returns `true` for every status a task can exit with.
    #[inline]
    pub fn is_completed(self) -> bool {
        !matches!(self, Status::New | Status::Running)
    }

    /// Returns `true` if this status is `Success`.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Returns `true` for `Failed` and `GuardFailed`.
    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failed(_) | Status::GuardFailed)
    }

    /// Returns `true` if this status is `Cancelled`.
    #[inline]
    pub fn is_cancelled(self) -> bool {
        matches!(self, Status::Cancelled)
    }

    /// Swaps success and failure. Every other status is returned unchanged.
    #[inline]
    pub fn invert(self) -> Self {
        match self {
            Status::Success => Status::ERROR,
            Status::Failed(_) | Status::GuardFailed => Status::Success,
            other => other,
        }
    }

    /// The status a controller reports when it completes because of a child
    /// that exited with `self`. A child's guard rejection is a plain failure
    /// for the controller, whose own guard passed.
    #[inline]
    pub(crate) fn outward(self) -> Self {
        match self {
            Status::GuardFailed => Status::ERROR,
            other => other,
        }
    }

    /// The status stored in a task's previous-status slot.
    #[inline]
    pub(crate) fn clamped(self) -> Self {
        match self {
            Status::Failed(code) => Status::Failed(code.clamp(codes::ERROR, codes::MAX_PREV_STATUS)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in [
            Status::New,
            Status::Running,
            Status::Success,
            Status::Cancelled,
            Status::ERROR,
            Status::GuardFailed,
            Status::Failed(42),
        ] {
            assert_eq!(Status::from_code(status.code()), status);
        }
    }

    #[test]
    fn failed_raises_low_codes() {
        assert_eq!(Status::failed(0), Status::ERROR);
        assert_eq!(Status::failed(2), Status::ERROR);
        assert_eq!(Status::failed(17), Status::Failed(17));
    }

    #[test]
    fn failed_never_becomes_guard_failure() {
        assert_eq!(Status::failed(codes::GUARD_FAILED), Status::Failed(5));
        assert_eq!(Status::failed(5).outward(), Status::Failed(5));
        assert_eq!(Status::GuardFailed.outward(), Status::ERROR);
    }

    #[test]
    fn invert_keeps_cancellation() {
        assert_eq!(Status::Success.invert(), Status::ERROR);
        assert_eq!(Status::Failed(9).invert(), Status::Success);
        assert_eq!(Status::GuardFailed.invert(), Status::Success);
        assert_eq!(Status::Cancelled.invert(), Status::Cancelled);
    }

    #[test]
    fn previous_status_is_clamped() {
        assert_eq!(Status::Failed(200).clamped(), Status::Failed(codes::MAX_PREV_STATUS));
        assert_eq!(Status::Failed(12).clamped(), Status::Failed(12));
        assert_eq!(Status::Failed(5).clamped(), Status::Failed(5));
        assert_eq!(Status::GuardFailed.clamped(), Status::GuardFailed);
    }
}
