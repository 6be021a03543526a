use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::context::CancelReason;
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Unit of queued work: a call, its priority and deadline, and the slot its
/// result is delivered to.
///
/// Consuming [`Task::complete`] guarantees at most one result per task.
#[derive(Debug)]
pub struct Task {
    /// Task ID (the tool use ID)
    pub id: String,
    pub tool_use: ToolUse,
    /// Higher runs first where ordering applies
    pub priority: i32,
    pub deadline: Option<Instant>,
    result_tx: oneshot::Sender<ToolResult>,
}

impl Task {
    /// Create a task together with the handle that will receive its result
    pub fn new(tool_use: ToolUse, priority: i32, deadline: Option<Instant>) -> (Self, TaskHandle) {
        let (result_tx, result_rx) = oneshot::channel();
        let id = tool_use.id.clone();
        let handle = TaskHandle {
            id: id.clone(),
            result_rx,
        };
        let task = Self {
            id,
            tool_use,
            priority,
            deadline,
            result_tx,
        };
        (task, handle)
    }

    /// Check if the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= Instant::now())
    }

    /// Deliver the result; a dropped handle is not an error
    pub fn complete(self, result: ToolResult) {
        if self.result_tx.send(result).is_err() {
            tracing::trace!(task_id = %self.id, "Task result discarded, handle dropped");
        }
    }

    /// Complete with `error`
    pub fn fail(self, error: &ToolError) {
        let result = ToolResult::from_error(&self.id, error);
        self.complete(result);
    }
}

/// Receiving side of a submitted task
#[derive(Debug)]
pub struct TaskHandle {
    id: String,
    result_rx: oneshot::Receiver<ToolResult>,
}

impl TaskHandle {
    /// ID of the task this handle belongs to
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the result.
    ///
    /// Resolves to a cancellation result if the task was dropped without
    /// completing, so every submission still yields exactly one result.
    pub async fn wait(self) -> ToolResult {
        match self.result_rx.await {
            Ok(result) => result,
            Err(_) => ToolResult::from_error(
                &self.id,
                &ToolError::Cancelled(CancelReason::Cancelled),
            ),
        }
    }

    /// Take the result if it has already been delivered
    pub fn try_result(&mut self) -> Option<ToolResult> {
        self.result_rx.try_recv().ok()
    }
}
