//! Structured start/end logging for every call

use async_trait::async_trait;
use std::time::Instant;

use super::{Middleware, Next};
use crate::context::CallContext;
use crate::tools::{ToolResult, ToolUse};

/// Records the start and end of each call; never alters the result
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a logging middleware
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        let started = Instant::now();
        tracing::debug!(
            tool = %tool_use.name,
            tool_use_id = %tool_use.id,
            trace_id = ctx.trace_id().unwrap_or_default(),
            "tool call started"
        );

        let result = next.run(ctx, tool_use).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if result.is_error {
            tracing::warn!(
                tool = %tool_use.name,
                tool_use_id = %tool_use.id,
                duration_ms,
                error = %result.content,
                "tool call failed"
            );
        } else {
            tracing::info!(
                tool = %tool_use.name,
                tool_use_id = %tool_use.id,
                duration_ms,
                "tool call succeeded"
            );
        }

        result
    }
}
