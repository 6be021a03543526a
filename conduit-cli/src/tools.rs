//! Built-in demo tools

use async_trait::async_trait;
use conduit_core::context::CallContext;
use conduit_core::tools::{BoxedTool, Tool, ToolInput, ValidationError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Every tool the CLI registers
pub fn builtin_tools() -> Vec<BoxedTool> {
    vec![Arc::new(EchoTool), Arc::new(SleepTool), Arc::new(ReadFileTool)]
}

fn required_str<'a>(input: &'a ToolInput, field: &str) -> Result<&'a str, ValidationError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::new(field, format!("{} must be a string", field)))
}

/// Returns `msg` unchanged
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the msg field"
    }

    fn validate(&self, input: &ToolInput) -> Result<(), ValidationError> {
        required_str(input, "msg").map(|_| ())
    }

    async fn execute(&self, _ctx: &CallContext, input: &ToolInput) -> anyhow::Result<String> {
        Ok(required_str(input, "msg")?.to_string())
    }
}

/// Sleeps for `ms` milliseconds
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Wait for ms milliseconds"
    }

    fn validate(&self, input: &ToolInput) -> Result<(), ValidationError> {
        match input.get("ms").and_then(Value::as_u64) {
            Some(_) => Ok(()),
            None => Err(ValidationError::new("ms", "ms must be a non-negative integer")),
        }
    }

    async fn execute(&self, _ctx: &CallContext, input: &ToolInput) -> anyhow::Result<String> {
        let ms = input.get("ms").and_then(Value::as_u64).unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(format!("slept {}ms", ms))
    }
}

/// Reads a UTF-8 file
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 file from path"
    }

    fn validate(&self, input: &ToolInput) -> Result<(), ValidationError> {
        required_str(input, "path").map(|_| ())
    }

    async fn execute(&self, _ctx: &CallContext, input: &ToolInput) -> anyhow::Result<String> {
        let path = required_str(input, "path")?;
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {}", path, e))
    }
}
