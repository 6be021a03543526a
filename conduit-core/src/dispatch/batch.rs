use std::sync::Arc;
use std::time::Duration;

use super::Dispatcher;
use crate::config::BatchConfig;
use crate::context::CallContext;
use crate::tools::{ToolError, ToolResult, ToolUse};

/// Splits large workloads into paced, individually time-bounded batches.
///
/// Inputs that fit in one batch go straight to the dispatcher's bounded
/// parallel mode. Larger inputs run batch by batch, each under its own
/// `batch_timeout`, with `pacing_delay` between batches. Cancellation during
/// a pause fills every remaining item with a cancellation result.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    dispatcher: Arc<Dispatcher>,
    batch_size: usize,
    batch_timeout: Duration,
    pacing_delay: Duration,
}

impl BatchProcessor {
    pub fn new(dispatcher: Arc<Dispatcher>, batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            dispatcher,
            batch_size: batch_size.max(1),
            batch_timeout,
            pacing_delay: BatchConfig::default().pacing_delay,
        }
    }

    pub fn from_config(dispatcher: Arc<Dispatcher>, config: &BatchConfig) -> Self {
        Self::new(dispatcher, config.batch_size, config.batch_timeout)
            .with_pacing_delay(config.pacing_delay)
    }

    /// Override the pause between batches
    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run every call, returning results in input order
    pub async fn process(&self, ctx: &CallContext, tool_uses: &[ToolUse]) -> Vec<ToolResult> {
        if tool_uses.len() <= self.batch_size {
            return self
                .dispatcher
                .execute_batch_with_context(ctx, tool_uses)
                .await;
        }

        let mut results = Vec::with_capacity(tool_uses.len());
        let batch_count = tool_uses.len().div_ceil(self.batch_size);

        for (index, batch) in tool_uses.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::select! {
                    biased;
                    reason = ctx.done() => {
                        tracing::debug!(
                            completed = results.len(),
                            remaining = tool_uses.len() - results.len(),
                            "Batch processing cancelled"
                        );
                        let error = ToolError::cancelled(reason);
                        results.extend(
                            tool_uses[results.len()..]
                                .iter()
                                .map(|tool_use| ToolResult::from_error(&tool_use.id, &error)),
                        );
                        return results;
                    }
                    _ = tokio::time::sleep(self.pacing_delay) => {}
                }
            }

            tracing::debug!(
                batch = index + 1,
                batches = batch_count,
                size = batch.len(),
                "Processing batch"
            );

            let batch_ctx = ctx.with_timeout(self.batch_timeout);
            results.extend(
                self.dispatcher
                    .execute_batch_with_context(&batch_ctx, batch)
                    .await,
            );
        }

        results
    }
}
