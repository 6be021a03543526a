//! Permission checks run before every tool execution
//!
//! The dispatcher calls [`SecurityValidator::check_permission`] after the tool
//! is resolved and before its input is validated. Sandboxing itself is out of
//! scope: validators only decide whether a call may proceed.

use serde_json::Value;
use std::collections::HashSet;

use super::tool::ToolInput;

/// Rejection returned by a security validator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PermissionDenied(pub String);

impl PermissionDenied {
    /// Create a rejection with a reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Security collaborator consulted by the dispatcher
pub trait SecurityValidator: Send + Sync {
    /// Decide whether `tool_name` may run with `input`
    fn check_permission(&self, tool_name: &str, input: &ToolInput) -> Result<(), PermissionDenied>;
}

/// Validator that permits every call
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SecurityValidator for AllowAll {
    fn check_permission(&self, _tool_name: &str, _input: &ToolInput) -> Result<(), PermissionDenied> {
        Ok(())
    }
}

/// Name-based allow/deny policy with blocked input patterns
///
/// Explicit deny wins over explicit allow, which wins over the default.
/// Blocked patterns are matched against every string value in the input,
/// nested maps and arrays included.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    allowed: HashSet<String>,
    denied: HashSet<String>,
    blocked_patterns: Vec<String>,
    default_allow: bool,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::deny_all()
    }
}

impl ToolPolicy {
    /// Create a policy that denies all tools by default
    pub fn deny_all() -> Self {
        Self {
            allowed: HashSet::new(),
            denied: HashSet::new(),
            blocked_patterns: Vec::new(),
            default_allow: false,
        }
    }

    /// Create a policy that allows all tools by default
    pub fn allow_all() -> Self {
        Self {
            default_allow: true,
            ..Self::deny_all()
        }
    }

    /// Allow a specific tool
    pub fn allow(mut self, tool: impl Into<String>) -> Self {
        let tool = tool.into();
        self.denied.remove(&tool);
        self.allowed.insert(tool);
        self
    }

    /// Deny a specific tool
    pub fn deny(mut self, tool: impl Into<String>) -> Self {
        let tool = tool.into();
        self.allowed.remove(&tool);
        self.denied.insert(tool);
        self
    }

    /// Reject any call whose input contains `pattern` in a string value
    pub fn block_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_patterns.push(pattern.into());
        self
    }

    /// Check if a tool name is allowed by this policy
    pub fn is_allowed(&self, tool: &str) -> bool {
        if self.denied.contains(tool) {
            return false;
        }
        if self.allowed.contains(tool) {
            return true;
        }
        self.default_allow
    }

    fn find_blocked<'a>(&'a self, value: &Value) -> Option<&'a str> {
        match value {
            Value::String(s) => self
                .blocked_patterns
                .iter()
                .find(|p| s.contains(p.as_str()))
                .map(String::as_str),
            Value::Array(items) => items.iter().find_map(|v| self.find_blocked(v)),
            Value::Object(map) => map.values().find_map(|v| self.find_blocked(v)),
            _ => None,
        }
    }
}

impl SecurityValidator for ToolPolicy {
    fn check_permission(&self, tool_name: &str, input: &ToolInput) -> Result<(), PermissionDenied> {
        if !self.is_allowed(tool_name) {
            return Err(PermissionDenied::new(format!(
                "tool '{}' is not allowed by policy",
                tool_name
            )));
        }

        if let Some(pattern) = input.values().find_map(|v| self.find_blocked(v)) {
            return Err(PermissionDenied::new(format!(
                "input contains blocked pattern '{}'",
                pattern
            )));
        }

        Ok(())
    }
}
