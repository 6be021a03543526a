//! Tool dispatch
//!
//! [`Dispatcher`] owns the registry and security collaborators and threads
//! each call through the middleware pipeline down to the core step:
//! registry lookup, permission check, input validation, execution.
//! [`BatchProcessor`] layers paced, fixed-size batching on top of it.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_core::dispatch::Dispatcher;
//! use conduit_core::tools::ToolUse;
//!
//! let dispatcher = Dispatcher::builder().tool(Arc::new(EchoTool)).build()?;
//! let result = dispatcher
//!     .execute(&ToolUse::new("1", "echo").with_input("msg", "hi"))
//!     .await;
//! assert_eq!(result.content, "hi");
//! ```

mod batch;
mod dispatcher;

pub use batch::BatchProcessor;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
