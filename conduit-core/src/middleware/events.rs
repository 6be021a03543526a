//! Tool lifecycle events for real-time observers
//!
//! Each pass through the middleware emits a `started` event carrying the
//! sanitized input and the attempt number, then exactly one terminal event:
//!
//! - `succeeded`: output truncated to `max_output_chars`, with `truncated`,
//!   `original_length`, `shown_length` and `output_lines` in the metadata
//! - `failed`: the raw error content, untouched
//!
//! The result handed back up the chain is never modified. Observer panics are
//! contained and logged so a faulty observer cannot fail a tool call.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_core::middleware::{ChannelObserver, EventsMiddleware};
//!
//! let (observer, mut rx) = ChannelObserver::channel(100);
//! dispatcher.add_middleware(Arc::new(EventsMiddleware::new(Some(Arc::new(observer)))));
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         println!("{} {:?}", event.name, event.event_type);
//!     }
//! });
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::recovery::panic_message;
use super::sanitize::{Sanitizer, truncate_chars};
use super::{Middleware, Next};
use crate::config::EventsConfig;
use crate::context::CallContext;
use crate::tools::{ToolInput, ToolResult, ToolUse};

/// Default cap on event output, in characters
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 20_000;

/// Lifecycle stage an event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventType {
    Started,
    Succeeded,
    Failed,
    Progress,
}

impl ToolEventType {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolEventType::Succeeded | ToolEventType::Failed)
    }
}

/// Snapshot of a tool call handed to observers; never stored by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    /// Tool use ID
    pub id: String,
    /// Tool name
    pub name: String,
    /// Sanitized input
    pub input: ToolInput,
    /// Output content, possibly truncated (succeeded and progress events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Raw error content (failed events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 1-based attempt number
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(rename = "type")]
    pub event_type: ToolEventType,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolEvent {
    /// Started event for a call
    pub fn started(tool_use: &ToolUse, input: ToolInput, attempt: u32) -> Self {
        Self {
            id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            input,
            output: None,
            error: None,
            attempt,
            started_at: Utc::now(),
            ended_at: None,
            duration: None,
            event_type: ToolEventType::Started,
            metadata: Map::new(),
        }
    }

    /// Progress update for a running call
    pub fn progress(tool_use: &ToolUse, attempt: u32, message: impl Into<String>) -> Self {
        Self {
            output: Some(message.into()),
            event_type: ToolEventType::Progress,
            ..Self::started(tool_use, Map::new(), attempt)
        }
    }

    /// Turn a started event into its terminal counterpart
    fn finish(mut self, event_type: ToolEventType, duration: Duration) -> Self {
        self.event_type = event_type;
        self.ended_at = Some(Utc::now());
        self.duration = Some(duration);
        self
    }

    /// Check if this event reports a failure
    pub fn is_failure(&self) -> bool {
        self.event_type == ToolEventType::Failed
    }
}

/// Receives tool events; called synchronously on the executing task
pub trait ToolObserver: Send + Sync {
    fn on_tool_event(&self, ctx: &CallContext, event: &ToolEvent);
}

/// Forwards events into a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::Sender<ToolEvent>,
}

impl ChannelObserver {
    /// Wrap an existing sender
    pub fn new(sender: mpsc::Sender<ToolEvent>) -> Self {
        Self { sender }
    }

    /// Create an observer and the receiving end of its channel
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ToolEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(sender), receiver)
    }
}

impl ToolObserver for ChannelObserver {
    fn on_tool_event(&self, _ctx: &CallContext, event: &ToolEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            tracing::debug!(tool = %event.name, tool_use_id = %event.id, error = %e, "tool event dropped");
        }
    }
}

/// Writes events to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ToolObserver for TracingObserver {
    fn on_tool_event(&self, ctx: &CallContext, event: &ToolEvent) {
        let trace_id = ctx.trace_id().unwrap_or_default();
        let input = Value::Object(event.input.clone()).to_string();
        let truncated = event.metadata.get("truncated").and_then(Value::as_bool);
        match event.event_type {
            ToolEventType::Started => tracing::info!(
                tool = %event.name,
                tool_use_id = %event.id,
                attempt = event.attempt,
                trace_id,
                input = %input,
                "tool started"
            ),
            ToolEventType::Succeeded => tracing::info!(
                tool = %event.name,
                tool_use_id = %event.id,
                attempt = event.attempt,
                trace_id,
                duration_ms = event.duration.map(|d| d.as_millis() as u64),
                truncated,
                "tool succeeded"
            ),
            ToolEventType::Failed => tracing::warn!(
                tool = %event.name,
                tool_use_id = %event.id,
                attempt = event.attempt,
                trace_id,
                duration_ms = event.duration.map(|d| d.as_millis() as u64),
                error = event.error.as_deref().unwrap_or_default(),
                "tool failed"
            ),
            ToolEventType::Progress => tracing::debug!(
                tool = %event.name,
                tool_use_id = %event.id,
                trace_id,
                message = event.output.as_deref().unwrap_or_default(),
                "tool progress"
            ),
        }
    }
}

/// Emits sanitized lifecycle events around every call
pub struct EventsMiddleware {
    observer: Option<Arc<dyn ToolObserver>>,
    sanitizer: Sanitizer,
    max_output_chars: usize,
}

impl std::fmt::Debug for EventsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsMiddleware")
            .field("has_observer", &self.observer.is_some())
            .field("sanitizer", &self.sanitizer)
            .field("max_output_chars", &self.max_output_chars)
            .finish()
    }
}

impl EventsMiddleware {
    /// Create with default mask keys and output cap
    pub fn new(observer: Option<Arc<dyn ToolObserver>>) -> Self {
        Self {
            observer,
            sanitizer: Sanitizer::default(),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    /// Create from configuration
    pub fn from_config(observer: Option<Arc<dyn ToolObserver>>, config: &EventsConfig) -> Self {
        Self {
            observer,
            sanitizer: Sanitizer::new(&config.mask_keys),
            max_output_chars: config.max_output_chars,
        }
    }

    /// Override the output cap
    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }

    /// Override the masked key substrings
    pub fn with_mask_keys<I, S>(mut self, mask_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sanitizer = Sanitizer::new(mask_keys);
        self
    }

    /// Deliver an event to the observer, containing any panic it raises
    pub fn emit(&self, ctx: &CallContext, event: &ToolEvent) {
        let Some(observer) = &self.observer else {
            return;
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.on_tool_event(ctx, event))) {
            tracing::warn!(
                tool = %event.name,
                tool_use_id = %event.id,
                panic = %panic_message(payload.as_ref()),
                "tool observer panicked"
            );
        }
    }

    /// Terminal event for a finished call
    fn terminal_event(&self, started: ToolEvent, result: &ToolResult, elapsed: Duration) -> ToolEvent {
        if result.is_error {
            let mut event = started.finish(ToolEventType::Failed, elapsed);
            event.error = Some(result.content.clone());
            return event;
        }

        let mut event = started.finish(ToolEventType::Succeeded, elapsed);
        let original_length = result.content.chars().count();
        let (output, truncated) = match truncate_chars(&result.content, self.max_output_chars) {
            Some(short) => (short, true),
            None => (result.content.clone(), false),
        };
        let shown_length = if truncated {
            self.max_output_chars
        } else {
            original_length
        };

        event.metadata.insert("truncated".into(), json!(truncated));
        event.metadata.insert("original_length".into(), json!(original_length));
        event.metadata.insert("shown_length".into(), json!(shown_length));
        event.metadata.insert(
            "output_lines".into(),
            json!(result.content.split('\n').count()),
        );
        event.output = Some(output);
        event
    }
}

#[async_trait]
impl Middleware for EventsMiddleware {
    fn name(&self) -> &str {
        "events"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        if self.observer.is_none() {
            return next.run(ctx, tool_use).await;
        }

        let started = ToolEvent::started(
            tool_use,
            self.sanitizer.sanitize_input(&tool_use.input),
            ctx.attempt(),
        );
        self.emit(ctx, &started);

        let clock = Instant::now();
        let result = next.run(ctx, tool_use).await;

        let terminal = self.terminal_event(started, &result, clock.elapsed());
        self.emit(ctx, &terminal);

        result
    }
}
