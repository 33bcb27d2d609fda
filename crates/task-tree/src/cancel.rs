//! Cooperative cancellation tokens.
//!
//! A [`CancelToken`] is a shared flag carrying a non-zero cancellation code.
//! Tasks never observe cancellation asynchronously: a running task checks its
//! token at well-defined checkpoints (before executing, after running a child,
//! between loop iterations) and transitions to `Cancelled` there.
//!
//! Tokens form a hierarchy:
//! - `clone()` shares the same flag (the default between a controller and its
//!   children, so cancelling an ancestor reaches the whole live subtree)
//! - [`CancelToken::new_child`] derives a token that also observes its parent
//! - [`CancelToken::new`] creates an independent root (used by `Join` for its
//!   children, so that cancelling one child never reaches its siblings)

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Code reported by [`CancelToken::cancel_default`].
pub const REASON_DEFAULT: u32 = 1;

#[derive(Debug)]
struct Inner {
    code: AtomicU32,
    parent: Option<CancelToken>,
}

/// Shared, hierarchical cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Creates an independent, uncancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                code: AtomicU32::new(0),
                parent: None,
            }),
        }
    }

    /// Derives a token that reports cancellation when either itself or any of
    /// its ancestors is cancelled.
    pub fn new_child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                code: AtomicU32::new(0),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Requests cancellation with the given reason code.
    ///
    /// The first request wins; later calls keep the original code. A code of
    /// zero is raised to [`REASON_DEFAULT`].
    pub fn cancel(&self, code: u32) {
        let code = code.max(REASON_DEFAULT);
        let _ = self
            .inner
            .code
            .compare_exchange(0, code, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Requests cancellation with [`REASON_DEFAULT`].
    pub fn cancel_default(&self) {
        self.cancel(REASON_DEFAULT);
    }

    /// Cancellation code of this token or its nearest cancelled ancestor, or 0.
    pub fn code(&self) -> u32 {
        let own = self.inner.code.load(Ordering::Acquire);
        if own != 0 {
            return own;
        }
        match &self.inner.parent {
            Some(parent) => parent.code(),
            None => 0,
        }
    }

    /// Returns `true` once cancellation has been requested on this token or
    /// an ancestor.
    #[inline]
    pub fn is_cancelling(&self) -> bool {
        self.code() != 0
    }

    /// Clears this token's own cancellation code. Ancestors are not touched.
    pub fn reset(&self) {
        self.inner.code.store(0, Ordering::Release);
    }

    /// Returns `true` if both handles share the same flag.
    pub fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let shared = token.clone();
        shared.cancel(7);
        assert!(token.is_cancelling());
        assert_eq!(token.code(), 7);
        assert!(token.same_token(&shared));
    }

    #[test]
    fn first_cancel_code_wins() {
        let token = CancelToken::new();
        token.cancel(3);
        token.cancel(9);
        assert_eq!(token.code(), 3);
    }

    #[test]
    fn child_observes_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.new_child();

        child.cancel_default();
        assert!(child.is_cancelling());
        assert!(!parent.is_cancelling());

        child.reset();
        parent.cancel(5);
        assert_eq!(child.code(), 5);
    }

    #[test]
    fn independent_tokens_are_isolated() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        a.cancel_default();
        assert!(!b.is_cancelling());
        assert!(!a.same_token(&b));
    }

    #[test]
    fn zero_code_is_raised() {
        let token = CancelToken::new();
        token.cancel(0);
        assert_eq!(token.code(), REASON_DEFAULT);
        token.reset();
        assert!(!token.is_cancelling());
    }
}
