//! Slow-call detection

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

use super::{Middleware, Next};
use crate::context::CallContext;
use crate::tools::{ToolResult, ToolUse};

/// Appends a warning to successful results that took longer than `threshold`
#[derive(Debug, Clone)]
pub struct PerformanceMiddleware {
    threshold: Duration,
}

impl PerformanceMiddleware {
    /// Create a middleware warning about calls slower than `threshold`
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Configured threshold
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

#[async_trait]
impl Middleware for PerformanceMiddleware {
    fn name(&self) -> &str {
        "performance"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        let started = Instant::now();
        let mut result = next.run(ctx, tool_use).await;
        let elapsed = started.elapsed();

        if elapsed > self.threshold && !result.is_error {
            tracing::warn!(
                tool = %tool_use.name,
                tool_use_id = %tool_use.id,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "slow tool call"
            );
            result.content.push_str(&format!(
                "\n\n[performance warning: tool '{}' took {:?}, exceeding threshold {:?}]",
                tool_use.name, elapsed, self.threshold
            ));
        }

        result
    }
}
