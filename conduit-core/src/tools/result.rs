//! Tool result and error taxonomy
//!
//! Every failure along the dispatch path is expressed as a [`ToolError`] and
//! converted into an error [`ToolResult`] as close to its origin as possible.
//! Nothing on the per-call path returns `Err` to the caller.

use serde::{Deserialize, Serialize};

use crate::context::CancelReason;

/// Placeholder content for a successful call that produced no output
pub const NO_OUTPUT: &str = "(no output)";

/// Outcome of exactly one [`ToolUse`](super::ToolUse)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool use this result answers
    pub tool_use_id: String,

    /// Output on success, description on failure
    pub content: String,

    /// Whether the call failed
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    ///
    /// Empty content is replaced by [`NO_OUTPUT`]; only error results carry
    /// empty content.
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            tool_use_id: tool_use_id.into(),
            content: if content.is_empty() {
                NO_OUTPUT.to_string()
            } else {
                content
            },
            is_error: false,
        }
    }

    /// Create an error result from a raw message
    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }

    /// Create an error result from a taxonomy error
    pub fn from_error(tool_use_id: impl Into<String>, error: &ToolError) -> Self {
        Self::error(tool_use_id, error.to_string())
    }

    /// Check if the call succeeded
    pub fn is_success(&self) -> bool {
        !self.is_error
    }
}

/// Failures a single call can end in
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Malformed tool use (missing ID or name)
    #[error("invalid tool use: {0}")]
    InvalidRequest(String),

    /// No tool registered under the requested name
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The security validator rejected the call
    #[error("permission denied for tool '{tool}': {reason}")]
    PermissionDenied {
        /// Tool name
        tool: String,
        /// Validator message
        reason: String,
    },

    /// Tool-specific input validation failed
    #[error("input validation failed: {0}")]
    Validation(String),

    /// The tool returned an error
    #[error("tool execution failed: {0}")]
    Execution(String),

    /// The executor queue had no room
    #[error("task queue is full")]
    QueueFull,

    /// Context ended while waiting for a rate limit token
    #[error("rate limit wait cancelled: {0}")]
    RateLimitCancelled(CancelReason),

    /// Caller cancelled the call
    #[error("execution cancelled: {0}")]
    Cancelled(CancelReason),

    /// Call ran past its deadline
    #[error("execution timeout: {0}")]
    Timeout(CancelReason),

    /// Task deadline passed before a worker picked it up
    #[error("task deadline exceeded")]
    DeadlineExceeded,

    /// Tool panicked during execution
    #[error("panic recovered in tool '{tool}': {message}")]
    Panic {
        /// Tool name
        tool: String,
        /// Panic payload rendered as text
        message: String,
    },
}

impl ToolError {
    /// Map a context cancellation to the matching error
    pub fn cancelled(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => ToolError::Cancelled(reason),
            CancelReason::DeadlineExceeded => ToolError::Timeout(reason),
        }
    }

    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidRequest(_) => ToolErrorKind::InvalidRequest,
            ToolError::NotFound(_) => ToolErrorKind::NotFound,
            ToolError::PermissionDenied { .. } => ToolErrorKind::PermissionDenied,
            ToolError::Validation(_) => ToolErrorKind::Validation,
            ToolError::Execution(_) => ToolErrorKind::Execution,
            ToolError::QueueFull | ToolError::RateLimitCancelled(_) => ToolErrorKind::Capacity,
            ToolError::Cancelled(_) | ToolError::Timeout(_) | ToolError::DeadlineExceeded => {
                ToolErrorKind::Cancelled
            }
            ToolError::Panic { .. } => ToolErrorKind::Fault,
        }
    }
}

/// Error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Malformed request shape
    InvalidRequest,

    /// Unknown tool name
    NotFound,

    /// Security check failure
    PermissionDenied,

    /// Tool-specific input rejection
    Validation,

    /// The tool itself failed
    Execution,

    /// Queue full or rate-limit wait aborted
    Capacity,

    /// Context expired or caller cancelled
    Cancelled,

    /// Runtime panic converted by the recovery middleware
    Fault,
}

/// Validation error for a specific input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field path (e.g., "input.path")
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}
