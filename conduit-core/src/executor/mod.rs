//! Bounded worker pool on top of a [`Dispatcher`]
//!
//! A fixed set of workers pulls tasks from one bounded FIFO queue. An
//! admission gate of the same size bounds in-flight executions. Each task
//! yields exactly one result on its [`TaskHandle`], including when the queue
//! is full, the deadline has passed, the tool panics or the pool shuts down.
//!
//! Submission policy on a full queue:
//! - [`ConcurrentExecutor::execute`], [`ConcurrentExecutor::execute_with_deadline`]
//!   and positive priorities fail fast with `task queue is full`
//! - priorities `<= 0` wait for queue space
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_core::executor::ConcurrentExecutor;
//!
//! let executor = ConcurrentExecutor::new(dispatcher, 4);
//! let results = executor.execute_batch(&calls).await;
//! executor.shutdown(Duration::from_secs(5)).await?;
//! ```

mod queue;
mod task;

pub use queue::PriorityQueue;
pub use task::{Task, TaskHandle};

use async_channel::{Receiver, Sender, TrySendError};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::context::{CallContext, CancelReason};
use crate::dispatch::Dispatcher;
use crate::error::{ConduitError, Result};
use crate::middleware::panic_message;
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Point-in-time view of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Tasks waiting in the queue
    pub queue_depth: usize,
    /// Executions currently holding an admission slot
    pub active_workers: usize,
    pub max_concurrency: usize,
    /// Entries in the result cache
    pub cached_results: usize,
}

/// Priority-aware bounded worker pool
pub struct ConcurrentExecutor {
    max_concurrency: usize,
    queue_size: usize,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    gate: Arc<Semaphore>,
    results: Arc<DashMap<String, ToolResult>>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConcurrentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentExecutor")
            .field("max_concurrency", &self.max_concurrency)
            .field("queue_size", &self.queue_size)
            .field("stats", &self.stats())
            .field("shut_down", &self.is_shutdown())
            .finish()
    }
}

impl ConcurrentExecutor {
    /// Start `max_concurrency` workers with a queue of `max_concurrency * 10`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(dispatcher: Arc<Dispatcher>, max_concurrency: usize) -> Self {
        Self::from_config(dispatcher, &ExecutorConfig::new(max_concurrency))
    }

    /// Start an executor from configuration
    pub fn from_config(dispatcher: Arc<Dispatcher>, config: &ExecutorConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        let queue_size = config.effective_queue_size();
        let (sender, receiver) = async_channel::bounded(queue_size);
        let gate = Arc::new(Semaphore::new(max_concurrency));
        let results = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        let workers = (0..max_concurrency)
            .map(|id| {
                let worker = Worker {
                    id,
                    dispatcher: Arc::clone(&dispatcher),
                    receiver: receiver.clone(),
                    gate: Arc::clone(&gate),
                    results: Arc::clone(&results),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::debug!(max_concurrency, queue_size, "Executor started");

        Self {
            max_concurrency,
            queue_size,
            sender,
            receiver,
            gate,
            results,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    /// Submit a zero-priority task; never waits for queue space
    pub fn execute(&self, tool_use: ToolUse) -> TaskHandle {
        self.try_submit(tool_use, 0, None)
    }

    /// Submit with a priority.
    ///
    /// Positive priorities fail fast on a full queue. Zero and negative
    /// priorities wait until there is room or the executor shuts down.
    pub async fn execute_with_priority(&self, tool_use: ToolUse, priority: i32) -> TaskHandle {
        if priority > 0 {
            return self.try_submit(tool_use, priority, None);
        }

        let (task, handle) = Task::new(tool_use, priority, None);
        if let Err(rejected) = self.sender.send(task).await {
            rejected
                .into_inner()
                .fail(&ToolError::Cancelled(CancelReason::Cancelled));
        }
        handle
    }

    /// Submit a zero-priority task that must start before `deadline`
    pub fn execute_with_deadline(&self, tool_use: ToolUse, deadline: Instant) -> TaskHandle {
        self.try_submit(tool_use, 0, Some(deadline))
    }

    fn try_submit(&self, tool_use: ToolUse, priority: i32, deadline: Option<Instant>) -> TaskHandle {
        let (task, handle) = Task::new(tool_use, priority, deadline);
        match self.sender.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                tracing::warn!(
                    task_id = %task.id,
                    queue_size = self.queue_size,
                    "Task queue full, rejecting"
                );
                task.fail(&ToolError::QueueFull);
            }
            Err(TrySendError::Closed(task)) => {
                task.fail(&ToolError::Cancelled(CancelReason::Cancelled));
            }
        }
        handle
    }

    /// Submit every call and collect results in input order.
    ///
    /// Items still unresolved when the executor shuts down receive a
    /// cancellation result.
    pub async fn execute_batch(&self, tool_uses: &[ToolUse]) -> Vec<ToolResult> {
        let handles: Vec<TaskHandle> = tool_uses
            .iter()
            .map(|tool_use| self.execute(tool_use.clone()))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let id = handle.id().to_string();
            let result = tokio::select! {
                biased;
                result = handle.wait() => result,
                _ = self.shutdown.cancelled() => {
                    ToolResult::from_error(&id, &ToolError::Cancelled(CancelReason::Cancelled))
                }
            };
            results.push(result);
        }
        results
    }

    /// Run each group as a batch, one group after another
    pub async fn execute_parallel(&self, groups: &[Vec<ToolUse>]) -> Vec<Vec<ToolResult>> {
        let mut results = Vec::with_capacity(groups.len());
        for group in groups {
            results.push(self.execute_batch(group).await);
        }
        results
    }

    /// Result of a completed task, by task ID
    pub fn get_result(&self, task_id: &str) -> Option<ToolResult> {
        self.results.get(task_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of queue and worker state
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            queue_depth: self.sender.len(),
            active_workers: self
                .max_concurrency
                .saturating_sub(self.gate.available_permits()),
            max_concurrency: self.max_concurrency,
            cached_results: self.results.len(),
        }
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting work, cancel running tasks and wait for the workers.
    ///
    /// Tasks still queued receive a cancellation result. Workers that
    /// outlive a timed-out call are awaited again by the next call; after a
    /// successful shutdown further calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ShutdownTimeout`] if the workers have not
    /// stopped within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Executor shutting down");
        self.shutdown.cancel();
        self.sender.close();

        let mut workers = std::mem::take(&mut *self.workers.lock());
        let joined = tokio::time::timeout(timeout, join_all(workers.iter_mut())).await;
        match joined {
            Ok(outcomes) => {
                for error in outcomes.into_iter().filter_map(|outcome| outcome.err()) {
                    tracing::error!(error = %error, "Worker exited abnormally");
                }
                drain(&self.receiver);
                tracing::debug!("Executor stopped");
                Ok(())
            }
            Err(_) => {
                workers.retain(|worker| !worker.is_finished());
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    still_running = workers.len(),
                    "Executor shutdown timed out"
                );
                self.workers.lock().extend(workers);
                Err(ConduitError::ShutdownTimeout(timeout))
            }
        }
    }
}

impl Drop for ConcurrentExecutor {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.sender.close();
    }
}

/// Fail every task left in the queue
fn drain(receiver: &Receiver<Task>) {
    while let Ok(task) = receiver.try_recv() {
        task.fail(&ToolError::Cancelled(CancelReason::Cancelled));
    }
}

struct Worker {
    id: usize,
    dispatcher: Arc<Dispatcher>,
    receiver: Receiver<Task>,
    gate: Arc<Semaphore>,
    results: Arc<DashMap<String, ToolResult>>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                task = self.receiver.recv() => match task {
                    Ok(task) => task,
                    Err(_) => break,
                },
            };

            let result = self.execute(&task).await;
            self.results.insert(task.id.clone(), result.clone());
            task.complete(result);
        }

        drain(&self.receiver);
        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn execute(&self, task: &Task) -> ToolResult {
        let cancelled = || {
            ToolResult::from_error(&task.id, &ToolError::Cancelled(CancelReason::Cancelled))
        };

        let _permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return cancelled(),
            permit = self.gate.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return cancelled(),
            },
        };

        if task.is_expired() {
            tracing::debug!(task_id = %task.id, "Task deadline passed before start");
            return ToolResult::from_error(&task.id, &ToolError::DeadlineExceeded);
        }

        let ctx = CallContext::with_cancellation(self.shutdown.child_token());
        let ctx = match task.deadline {
            Some(deadline) => ctx.with_deadline(deadline),
            None => ctx,
        };

        let call = self.dispatcher.execute_with_context(&ctx, &task.tool_use);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    worker = self.id,
                    task_id = %task.id,
                    panic = %message,
                    "Panic escaped dispatcher"
                );
                ToolResult::from_error(
                    &task.id,
                    &ToolError::Panic {
                        tool: task.tool_use.name.clone(),
                        message,
                    },
                )
            }
        }
    }
}
