//! Composable middleware pipeline around tool execution
//!
//! A middleware receives the call context, the tool use and a [`Next`]
//! continuation standing for "the rest of the pipeline, ending in the core
//! dispatch step". Pipelines compose by nesting: the first registered
//! middleware wraps every later one, so registration order is execution order
//! from the outside in.
//!
//! Standard middleware:
//! - [`LoggingMiddleware`]: start/end records, purely observational
//! - [`PerformanceMiddleware`]: annotates slow successful results
//! - [`RecoveryMiddleware`]: converts panics into error results
//! - [`RetryMiddleware`]: pattern-gated retries with a fixed delay
//! - [`RateLimitMiddleware`]: waits for a token bucket permit
//! - [`CacheMiddleware`]: TTL cache keyed by tool name and input
//! - [`TimeoutMiddleware`]: bounds the rest of the chain with a deadline
//! - [`EventsMiddleware`]: sanitized started/terminal events for observers
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_core::middleware::{LoggingMiddleware, RecoveryMiddleware};
//!
//! dispatcher.add_middleware(Arc::new(LoggingMiddleware::new()));
//! // Recovery last so it wraps exactly the core step
//! dispatcher.add_middleware(Arc::new(RecoveryMiddleware::new()));
//! ```

mod cache;
mod events;
mod logging;
mod performance;
mod rate_limit;
mod recovery;
mod retry;
mod sanitize;
mod timeout;

pub use cache::CacheMiddleware;
pub use events::{
    ChannelObserver, EventsMiddleware, ToolEvent, ToolEventType, ToolObserver, TracingObserver,
};
pub use logging::LoggingMiddleware;
pub use performance::PerformanceMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use recovery::RecoveryMiddleware;
pub(crate) use recovery::panic_message;
pub use retry::RetryMiddleware;
pub use sanitize::{MASK, STRING_VALUE_LIMIT, Sanitizer, TRUNCATION_MARKER};
pub use timeout::TimeoutMiddleware;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ConduitConfig;
use crate::context::CallContext;
use crate::rate_limiter::RateLimiter;
use crate::tools::{ToolResult, ToolUse};

/// Interceptor wrapped around tool execution
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Handle one call, delegating to `next` zero or more times
    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult;
}

/// Innermost step of a pipeline
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Execute the call without any further middleware
    async fn call(&self, ctx: &CallContext, tool_use: &ToolUse) -> ToolResult;
}

/// Continuation handed to a middleware
///
/// `Next` is `Copy`, so a middleware such as retry may run the remainder of
/// the chain more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Build a continuation over `middleware` ending in `endpoint`
    pub fn new(middleware: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            middleware,
            endpoint,
        }
    }

    /// Run the rest of the pipeline
    pub async fn run(self, ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                };
                current.handle(ctx, tool_use, next).await
            }
            None => self.endpoint.call(ctx, tool_use).await,
        }
    }

    /// Number of middleware still ahead of the endpoint
    pub fn remaining(&self) -> usize {
        self.middleware.len()
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Build the standard pipeline from configuration, outermost first.
///
/// Order: logging, performance, cache, retry, rate limit, events, recovery.
/// Events sit inside retry so each attempt emits its own started/terminal
/// pair; recovery is innermost so it wraps exactly the core step. Must be
/// called inside a tokio runtime when the rate limiter is enabled.
pub fn standard_stack(
    config: &ConduitConfig,
    observer: Option<Arc<dyn ToolObserver>>,
) -> Vec<Arc<dyn Middleware>> {
    let mut stack: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(LoggingMiddleware::new()),
        Arc::new(PerformanceMiddleware::new(config.performance.threshold)),
    ];

    if config.cache.enabled {
        stack.push(Arc::new(CacheMiddleware::with_capacity(
            config.cache.ttl,
            config.cache.max_entries,
        )));
    }

    stack.push(Arc::new(RetryMiddleware::from_config(&config.retry)));

    if config.rate_limit.enabled {
        let limiter = RateLimiter::new(config.rate_limit.rate, config.rate_limit.max_tokens);
        stack.push(Arc::new(RateLimitMiddleware::new(Arc::new(limiter))));
    }

    if config.events.enabled {
        stack.push(Arc::new(EventsMiddleware::from_config(
            observer,
            &config.events,
        )));
    }

    stack.push(Arc::new(RecoveryMiddleware::new()));
    stack
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for middleware tests

    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Endpoint that replays scripted results and counts calls
    pub struct ScriptedEndpoint {
        responses: Mutex<Vec<ToolResult>>,
        fallback: Option<ToolResult>,
        pub calls: AtomicUsize,
        pub attempts_seen: Mutex<Vec<u32>>,
    }

    impl ScriptedEndpoint {
        /// Always answer with success content
        pub fn ok(content: &str) -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                fallback: Some(ToolResult::success("", content)),
                calls: AtomicUsize::new(0),
                attempts_seen: Mutex::new(Vec::new()),
            }
        }

        /// Answer with `responses` in order, then repeat the last one
        pub fn sequence(responses: Vec<ToolResult>) -> Self {
            let fallback = responses.last().cloned();
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                fallback,
                calls: AtomicUsize::new(0),
                attempts_seen: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Endpoint for ScriptedEndpoint {
        async fn call(&self, ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.attempts_seen.lock().push(ctx.attempt());
            let mut result = self
                .responses
                .lock()
                .pop()
                .or_else(|| self.fallback.clone())
                .unwrap_or_else(|| ToolResult::error("", "no scripted response"));
            result.tool_use_id = tool_use.id.clone();
            result
        }
    }

    /// Run `middleware` alone around `endpoint`
    pub async fn run_one(
        middleware: Arc<dyn Middleware>,
        endpoint: &dyn Endpoint,
        ctx: &CallContext,
        tool_use: &ToolUse,
    ) -> ToolResult {
        let chain = [middleware];
        Next::new(&chain, endpoint).run(ctx, tool_use).await
    }
}
