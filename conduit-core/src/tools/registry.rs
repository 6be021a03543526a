//! Tool registry for registration and lookup
//!
//! The dispatcher consumes any [`Registry`] implementation. [`ToolRegistry`]
//! is the in-memory default: duplicate detection on registration, lookup by
//! name, and name-sorted listing, all safe to share across tasks.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::tool::{BoxedTool, Tool};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Tool with this name already exists
    DuplicateTool(String),
    /// Tool not found
    NotFound(String),
    /// Tool rejected at registration time
    Invalid(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateTool(name) => {
                write!(f, "Tool '{}' is already registered", name)
            }
            RegistryError::NotFound(name) => {
                write!(f, "Tool '{}' not found", name)
            }
            RegistryError::Invalid(msg) => {
                write!(f, "Invalid tool: {}", msg)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Name → tool resolution used by the dispatcher
pub trait Registry: Send + Sync {
    /// Register a tool
    fn register(&self, tool: BoxedTool) -> Result<(), RegistryError>;

    /// Look up a tool by name
    fn get(&self, name: &str) -> Result<BoxedTool, RegistryError>;

    /// All registered tools
    fn list(&self) -> Vec<BoxedTool>;

    /// Check if a tool is registered
    fn has(&self, name: &str) -> bool;

    /// Remove every tool
    fn clear(&self);
}

/// In-memory registry
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools = self.tools.read();
        f.debug_struct("ToolRegistry")
            .field("tool_count", &tools.len())
            .field("tools", &tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Unregister a tool by name
    ///
    /// Returns the tool if found, None otherwise.
    pub fn unregister(&self, name: &str) -> Option<BoxedTool> {
        self.tools.write().remove(name)
    }

    /// Get all tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl Registry for ToolRegistry {
    fn register(&self, tool: BoxedTool) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::Invalid("tool name is empty".to_string()));
        }

        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<BoxedTool, RegistryError> {
        self.tools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn list(&self) -> Vec<BoxedTool> {
        let mut tools: Vec<BoxedTool> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    fn has(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    fn clear(&self) {
        self.tools.write().clear();
    }
}
