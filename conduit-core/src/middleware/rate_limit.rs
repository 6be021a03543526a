//! Token bucket gate in front of the core step

use async_trait::async_trait;
use std::sync::Arc;

use super::{Middleware, Next};
use crate::context::CallContext;
use crate::rate_limiter::RateLimiter;
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Waits for a token before letting the call proceed
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Gate calls on a shared limiter
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Underlying limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        if let Err(reason) = self.limiter.acquire(ctx).await {
            tracing::debug!(
                tool = %tool_use.name,
                tool_use_id = %tool_use.id,
                reason = %reason,
                "rate limit wait abandoned"
            );
            return ToolResult::from_error(&tool_use.id, &ToolError::RateLimitCancelled(reason));
        }

        next.run(ctx, tool_use).await
    }
}
