//! Pattern-gated retries
//!
//! Only error results whose content contains one of the retryable substrings
//! (case-sensitive) are retried; any other failure is returned on first
//! occurrence. The 1-based attempt number is threaded to downstream
//! middleware through [`CallContext::attempt`].

use async_trait::async_trait;
use std::time::Duration;

use super::{Middleware, Next};
use crate::config::{DEFAULT_RETRYABLE_PATTERNS, RetryConfig};
use crate::context::CallContext;
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Re-invokes the rest of the chain up to `max_retries + 1` times
#[derive(Debug, Clone)]
pub struct RetryMiddleware {
    max_retries: u32,
    retry_delay: Duration,
    retryable_patterns: Vec<String>,
}

impl RetryMiddleware {
    /// Create a retry middleware with the default retryable patterns
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            retryable_patterns: DEFAULT_RETRYABLE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Create a retry middleware from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            retryable_patterns: config.retryable_patterns.clone(),
        }
    }

    /// Replace the retryable substrings
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.retryable_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Check if a failed result should be retried
    pub fn is_retryable(&self, result: &ToolResult) -> bool {
        result.is_error
            && self
                .retryable_patterns
                .iter()
                .any(|pattern| result.content.contains(pattern.as_str()))
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            let result = next.run(&ctx.with_attempt(attempt), tool_use).await;

            if !self.is_retryable(&result) {
                return result;
            }

            if attempt >= max_attempts {
                if attempt == 1 {
                    return result;
                }
                tracing::warn!(
                    tool = %tool_use.name,
                    tool_use_id = %tool_use.id,
                    attempts = attempt,
                    "retries exhausted"
                );
                return ToolResult::error(
                    &tool_use.id,
                    format!("{} (failed after {} attempts)", result.content, attempt),
                );
            }

            tracing::debug!(
                tool = %tool_use.name,
                tool_use_id = %tool_use.id,
                attempt,
                delay_ms = self.retry_delay.as_millis() as u64,
                error = %result.content,
                "retrying tool call"
            );

            tokio::select! {
                biased;
                reason = ctx.done() => {
                    return ToolResult::from_error(&tool_use.id, &ToolError::cancelled(reason));
                }
                _ = tokio::time::sleep(self.retry_delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::{ScriptedEndpoint, run_one};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn retry(max_retries: u32) -> Arc<RetryMiddleware> {
        Arc::new(RetryMiddleware::new(max_retries, Duration::from_millis(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_until_success() {
        let endpoint = ScriptedEndpoint::sequence(vec![
            ToolResult::error("", "connection refused"),
            ToolResult::error("", "read timeout"),
            ToolResult::success("", "ok"),
        ]);

        let result = run_one(retry(3), &endpoint, &CallContext::new(), &ToolUse::new("1", "t")).await;

        assert_eq!(result, ToolResult::success("1", "ok"));
        assert_eq!(endpoint.call_count(), 3);
        assert_eq!(*endpoint.attempts_seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let endpoint = ScriptedEndpoint::sequence(vec![ToolResult::error("", "gateway timeout")]);

        let result = run_one(retry(2), &endpoint, &CallContext::new(), &ToolUse::new("1", "t")).await;

        assert!(result.is_error);
        assert!(result.content.contains("gateway timeout"));
        assert!(result.content.contains("failed after 3 attempts"));
        assert_eq!(endpoint.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_single_attempt() {
        let endpoint = ScriptedEndpoint::sequence(vec![ToolResult::error("", "file not found")]);

        let result = run_one(retry(5), &endpoint, &CallContext::new(), &ToolUse::new("1", "t")).await;

        assert_eq!(result.content, "file not found");
        assert_eq!(endpoint.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_patterns_are_case_sensitive() {
        let endpoint = ScriptedEndpoint::sequence(vec![ToolResult::error("", "Timeout while reading")]);

        run_one(retry(3), &endpoint, &CallContext::new(), &ToolUse::new("1", "t")).await;

        assert_eq!(endpoint.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let endpoint = ScriptedEndpoint::sequence(vec![
            ToolResult::error("", "temporary failure in name resolution"),
            ToolResult::success("", "ok"),
        ]);

        let start = Instant::now();
        run_one(retry(1), &endpoint, &CallContext::new(), &ToolUse::new("1", "t")).await;

        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_delay() {
        let endpoint = ScriptedEndpoint::sequence(vec![ToolResult::error("", "network unreachable")]);
        let middleware = Arc::new(RetryMiddleware::new(5, Duration::from_secs(10)));
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));

        let result = run_one(middleware, &endpoint, &ctx, &ToolUse::new("1", "t")).await;

        assert!(result.is_error);
        assert!(result.content.contains("context deadline exceeded"));
        assert_eq!(endpoint.call_count(), 1);
    }

    #[test]
    fn test_custom_patterns() {
        let middleware = RetryMiddleware::new(1, Duration::ZERO).with_patterns(["503"]);
        assert!(middleware.is_retryable(&ToolResult::error("1", "HTTP 503")));
        assert!(!middleware.is_retryable(&ToolResult::error("1", "timeout")));
        assert!(!middleware.is_retryable(&ToolResult::success("1", "503")));
        assert_eq!(middleware.max_attempts(), 2);
    }
}
