//! Panic barrier around the rest of the pipeline
//!
//! Install last so it wraps exactly the core step; middleware outside it then
//! see an ordinary error result and keep their post-processing.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use super::{Middleware, Next};
use crate::context::CallContext;
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Converts a panic during execution into an error result
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Create a recovery middleware
    pub fn new() -> Self {
        Self
    }
}

/// Render a panic payload as text
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &str {
        "recovery"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        match AssertUnwindSafe(next.run(ctx, tool_use)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    tool = %tool_use.name,
                    tool_use_id = %tool_use.id,
                    panic = %message,
                    "panic recovered during tool execution"
                );
                ToolResult::from_error(
                    &tool_use.id,
                    &ToolError::Panic {
                        tool: tool_use.name.clone(),
                        message,
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use crate::middleware::test_support::run_one;
    use std::sync::Arc;

    struct PanickingEndpoint;

    #[async_trait]
    impl Endpoint for PanickingEndpoint {
        async fn call(&self, _ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
            if tool_use.name == "explode" {
                panic!("index out of range");
            }
            ToolResult::success(&tool_use.id, "fine")
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_error_result() {
        let result = run_one(
            Arc::new(RecoveryMiddleware::new()),
            &PanickingEndpoint,
            &CallContext::new(),
            &ToolUse::new("p1", "explode"),
        )
        .await;

        assert!(result.is_error);
        assert_eq!(result.tool_use_id, "p1");
        assert!(result.content.contains("panic recovered"));
        assert!(result.content.contains("index out of range"));
    }

    #[tokio::test]
    async fn test_normal_result_untouched() {
        let result = run_one(
            Arc::new(RecoveryMiddleware::new()),
            &PanickingEndpoint,
            &CallContext::new(),
            &ToolUse::new("p2", "calm"),
        )
        .await;

        assert_eq!(result, ToolResult::success("p2", "fine"));
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
