use async_trait::async_trait;
use std::time::Duration;

use super::{Middleware, Next};
use crate::context::{CallContext, CancelReason};
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Bounds the rest of the chain with its own deadline.
///
/// The derived context never outlives the caller's deadline, so a shorter
/// outer deadline still wins.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        let bounded = ctx.with_timeout(self.timeout);

        tokio::select! {
            biased;
            reason = bounded.done() => {
                if reason == CancelReason::DeadlineExceeded {
                    tracing::warn!(
                        tool = %tool_use.name,
                        tool_use_id = %tool_use.id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "tool call timed out"
                    );
                }
                ToolResult::from_error(&tool_use.id, &ToolError::cancelled(reason))
            }
            result = next.run(&bounded, tool_use) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use crate::middleware::test_support::run_one;
    use std::sync::Arc;

    /// Sleeps without watching the context
    struct Stubborn(Duration);

    #[async_trait]
    impl Endpoint for Stubborn {
        async fn call(&self, _ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
            tokio::time::sleep(self.0).await;
            ToolResult::success(&tool_use.id, "late")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let middleware = Arc::new(TimeoutMiddleware::new(Duration::from_millis(50)));

        let result = run_one(
            middleware,
            &Stubborn(Duration::from_secs(5)),
            &CallContext::new(),
            &ToolUse::new("t1", "slow"),
        )
        .await;

        assert!(result.is_error);
        assert_eq!(result.content, "execution timeout: context deadline exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes() {
        let middleware = Arc::new(TimeoutMiddleware::new(Duration::from_secs(1)));

        let result = run_one(
            middleware,
            &Stubborn(Duration::from_millis(10)),
            &CallContext::new(),
            &ToolUse::new("t2", "quick"),
        )
        .await;

        assert_eq!(result, ToolResult::success("t2", "late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancel_is_not_a_timeout() {
        let middleware = Arc::new(TimeoutMiddleware::new(Duration::from_secs(60)));
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = run_one(
            middleware,
            &Stubborn(Duration::from_secs(5)),
            &ctx,
            &ToolUse::new("t3", "slow"),
        )
        .await;

        assert!(result.is_error);
        assert_eq!(result.content, "execution cancelled: context canceled");
    }
}
