//! Per-call execution context
//!
//! Every dispatch path receives a [`CallContext`]. It bundles a cancellation
//! token, an optional deadline and the current attempt number, so middleware
//! can race their suspension points against cancellation without reaching
//! for untyped context storage.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped accepting work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The context (or one of its parents) was cancelled explicitly
    Cancelled,
    /// The context deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context canceled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Context threaded through the middleware chain for one tool call
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    attempt: u32,
    trace_id: Option<String>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// Create a root context that is never cancelled unless asked to
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            attempt: 1,
            trace_id: None,
        }
    }

    /// Create a root context driven by an existing cancellation token
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::new()
        }
    }

    /// Set trace ID for correlation in logs and events
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Trace ID, if any
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Derive a child context. Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            ..self.clone()
        }
    }

    /// Derive a child context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child context that expires at `deadline`.
    ///
    /// The effective deadline never extends past the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        child
    }

    /// Same context tagged with a different 1-based attempt number
    pub fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    /// Current attempt number (1-based)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reason the context is done, or `None` while it is still live
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Check if the context has been cancelled or has expired
    pub fn is_done(&self) -> bool {
        self.cancel_reason().is_some()
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_is_live() {
        let ctx = CallContext::new();
        assert!(!ctx.is_done());
        assert_eq!(ctx.attempt(), 1);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_child_cancel_does_not_touch_parent() {
        let parent = CallContext::new();
        let child = parent.child();

        child.cancel();

        assert_eq!(child.cancel_reason(), Some(CancelReason::Cancelled));
        assert!(!parent.is_done());
    }

    #[test]
    fn test_parent_cancel_propagates() {
        let parent = CallContext::new();
        let child = parent.with_timeout(Duration::from_secs(60));

        parent.cancel();

        assert_eq!(child.cancel_reason(), Some(CancelReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());

        let reason = ctx.done().await;

        assert_eq!(reason, CancelReason::DeadlineExceeded);
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_extends_parent() {
        let parent = CallContext::new().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(10));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn test_attempt_is_carried_on_clone() {
        let ctx = CallContext::new().with_trace_id("trace-1").with_attempt(3);
        assert_eq!(ctx.attempt(), 3);
        assert_eq!(ctx.trace_id(), Some("trace-1"));
        assert_eq!(CancelReason::Cancelled.to_string(), "context canceled");
    }
}
