//! # Conduit - Tool Dispatch and Concurrency Control
//!
//! Conduit is the execution core that sits between an agent deciding *which*
//! tools to call and the tools themselves. It provides:
//! - A dispatcher resolving tool names to permission-checked, validated calls
//! - A composable middleware pipeline (logging, retries, rate limiting,
//!   caching, panic recovery, sanitized event emission)
//! - A bounded worker pool with priorities, deadlines and graceful shutdown
//! - A token bucket rate limiter and a paced batch processor
//!
//! Every call produces exactly one [`ToolResult`](tools::ToolResult). Per-call
//! failures are error results, never `Err`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConduitConfig::load()?;
//!     let dispatcher = Dispatcher::builder()
//!         .config(config.dispatcher.clone())
//!         .middleware_stack(standard_stack(&config, Some(Arc::new(TracingObserver))))
//!         .tool(Arc::new(EchoTool))
//!         .build()?;
//!
//!     let executor = ConcurrentExecutor::from_config(Arc::new(dispatcher), &config.executor);
//!     let result = executor
//!         .execute(ToolUse::new("1", "echo").with_input("msg", "hi"))
//!         .wait()
//!         .await;
//!
//!     executor.shutdown(Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod rate_limiter;
pub mod tools;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        BatchConfig, CacheConfig, ConduitConfig, DispatcherConfig, EventsConfig, ExecutorConfig,
        PerformanceConfig, RateLimitConfig, RetryConfig,
    };
    pub use crate::context::{CallContext, CancelReason};
    pub use crate::dispatch::{BatchProcessor, Dispatcher, DispatcherBuilder};
    pub use crate::error::{ConduitError, Result};
    pub use crate::executor::{ConcurrentExecutor, ExecutorStats, TaskHandle};
    pub use crate::middleware::{
        CacheMiddleware, ChannelObserver, Endpoint, EventsMiddleware, LoggingMiddleware,
        Middleware, Next, PerformanceMiddleware, RateLimitMiddleware, RecoveryMiddleware,
        RetryMiddleware, Sanitizer, TimeoutMiddleware, ToolEvent, ToolEventType, ToolObserver,
        TracingObserver, standard_stack,
    };
    pub use crate::rate_limiter::RateLimiter;
    pub use crate::tools::{
        AllowAll, BoxedTool, PermissionDenied, Registry, RegistryError, SecurityValidator, Tool,
        ToolError, ToolErrorKind, ToolInput, ToolPolicy, ToolRegistry, ToolResult, ToolUse,
        ValidationError,
    };
}
