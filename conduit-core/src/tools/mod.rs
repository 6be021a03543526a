//! Tool abstractions consumed by the dispatch core
//!
//! This module defines the request/response types that flow through the
//! dispatcher along with the collaborator seams it depends on:
//! - [`Tool`]: a named capability with input validation and async execution
//! - [`Registry`]: name → tool resolution (with [`ToolRegistry`] as the in-memory default)
//! - [`SecurityValidator`]: permission checks before execution
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_core::tools::{ToolRegistry, ToolUse, Registry};
//!
//! let registry = ToolRegistry::new();
//! registry.register(my_tool)?;
//!
//! let call = ToolUse::new("call_1", "echo").with_input("msg", "hi");
//! ```

mod registry;
mod result;
mod security;
mod tool;

pub use registry::{Registry, RegistryError, ToolRegistry};
pub use result::{NO_OUTPUT, ToolError, ToolErrorKind, ToolResult, ValidationError};
pub use security::{AllowAll, PermissionDenied, SecurityValidator, ToolPolicy};
pub use tool::{BoxedTool, Tool, ToolInput, ToolUse};
