//! Tool trait and request descriptor
//!
//! Tools are the primary way an agent interacts with the world. The dispatch
//! core never implements tool logic itself; it resolves a [`ToolUse`] to a
//! registered [`Tool`] and drives it through validation and execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::result::ValidationError;
use crate::context::CallContext;

/// Ordered key → value map passed to a tool
pub type ToolInput = serde_json::Map<String, Value>;

/// One tool invocation requested by the agent
///
/// Immutable once created. `id` is reused as the cache and result key, but
/// uniqueness across concurrent submissions is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    /// Invocation ID (non-empty)
    pub id: String,

    /// Registered tool name (non-empty)
    pub name: String,

    /// Tool input, possibly empty
    #[serde(default)]
    pub input: ToolInput,
}

impl ToolUse {
    /// Create a tool use with an empty input map
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: ToolInput::new(),
        }
    }

    /// Add an input value
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    /// Replace the whole input map
    pub fn with_input_map(mut self, input: ToolInput) -> Self {
        self.input = input;
        self
    }

    /// Check the request shape before it enters the pipeline
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("tool use ID is required".to_string());
        }
        if self.name.is_empty() {
            return Err("tool name is required".to_string());
        }
        Ok(())
    }

    /// Serialize the input map the way the cache keys it
    pub fn input_json(&self) -> String {
        serde_json::to_string(&self.input).unwrap_or_default()
    }
}

/// Core tool trait
///
/// Implement this trait to expose a capability to the dispatcher. The
/// dispatcher checks permissions and calls `validate` before `execute`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Validate input before execution
    ///
    /// Default implementation accepts everything.
    fn validate(&self, _input: &ToolInput) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Execute the tool and return its textual output
    ///
    /// Long-running tools should watch `ctx` and return early once it is
    /// done; the dispatcher stops waiting on them either way.
    async fn execute(&self, ctx: &CallContext, input: &ToolInput) -> anyhow::Result<String>;
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;
