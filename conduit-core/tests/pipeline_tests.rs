//! End-to-end tests for the dispatcher running the standard middleware stack
//!
//! These tests wire real tools, the configured middleware pipeline and an
//! event observer together and check the behaviour callers rely on.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use conduit_core::middleware::{MASK, TRUNCATION_MARKER};
use conduit_core::prelude::*;

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, _ctx: &CallContext, input: &ToolInput) -> anyhow::Result<String> {
        Ok(input
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Fails with `error` for the first `failures` calls, then succeeds
struct FlakyTool {
    name: &'static str,
    error: &'static str,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyTool {
    fn new(name: &'static str, error: &'static str, failures: usize) -> Self {
        Self {
            name,
            error,
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, _ctx: &CallContext, _input: &ToolInput) -> anyhow::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("{}", self.error);
        }
        Ok(format!("succeeded on call {}", call + 1))
    }
}

struct LongOutputTool(usize);

#[async_trait]
impl Tool for LongOutputTool {
    fn name(&self) -> &str {
        "long"
    }

    async fn execute(&self, _ctx: &CallContext, _input: &ToolInput) -> anyhow::Result<String> {
        Ok("x".repeat(self.0))
    }
}

struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }

    async fn execute(&self, _ctx: &CallContext, _input: &ToolInput) -> anyhow::Result<String> {
        panic!("unexpected state")
    }
}

fn test_config() -> ConduitConfig {
    let mut config = ConduitConfig::default();
    config.retry.retry_delay = Duration::from_millis(10);
    config
}

fn build(
    config: &ConduitConfig,
    tools: Vec<BoxedTool>,
) -> (Dispatcher, mpsc::Receiver<ToolEvent>) {
    let (observer, events) = ChannelObserver::channel(256);
    let dispatcher = Dispatcher::builder()
        .config(config.dispatcher.clone())
        .middleware_stack(standard_stack(config, Some(Arc::new(observer))))
        .build()
        .unwrap();
    dispatcher.register_all(tools).unwrap();
    (dispatcher, events)
}

fn drain(events: &mut mpsc::Receiver<ToolEvent>) -> Vec<ToolEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_echo_scenario() {
    let (dispatcher, _events) = build(&test_config(), vec![Arc::new(EchoTool)]);

    let result = dispatcher
        .execute(&ToolUse::new("1", "echo").with_input("msg", "hi"))
        .await;

    assert_eq!(
        result,
        ToolResult {
            tool_use_id: "1".to_string(),
            content: "hi".to_string(),
            is_error: false,
        }
    );
}

#[tokio::test]
async fn test_unknown_tool_scenario() {
    let (dispatcher, mut events) = build(&test_config(), vec![Arc::new(EchoTool)]);

    let result = dispatcher.execute(&ToolUse::new("1", "ghost")).await;

    assert!(result.is_error);
    assert!(result.content.contains("tool not found"));
    // not-found is not retryable: one attempt, one event pair
    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, ToolEventType::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retried_with_event_per_attempt() {
    let flaky = Arc::new(FlakyTool::new("flaky", "connection timeout", 2));
    let (dispatcher, mut events) = build(&test_config(), vec![flaky.clone()]);

    let result = dispatcher.execute(&ToolUse::new("r1", "flaky")).await;

    assert_eq!(result.content, "succeeded on call 3");
    assert_eq!(flaky.calls(), 3);

    let events = drain(&mut events);
    let started: Vec<u32> = events
        .iter()
        .filter(|e| e.event_type == ToolEventType::Started)
        .map(|e| e.attempt)
        .collect();
    assert_eq!(started, vec![1, 2, 3]);
    let terminal: Vec<ToolEventType> = events
        .iter()
        .filter(|e| e.event_type.is_terminal())
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        terminal,
        vec![
            ToolEventType::Failed,
            ToolEventType::Failed,
            ToolEventType::Succeeded
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_reports_aggregate_failure() {
    let flaky = Arc::new(FlakyTool::new("flaky", "read timeout", usize::MAX));
    let (dispatcher, _events) = build(&test_config(), vec![flaky.clone()]);

    let result = dispatcher.execute(&ToolUse::new("r2", "flaky")).await;

    assert!(result.is_error);
    assert!(result.content.contains("read timeout"));
    assert!(result.content.contains("failed after 4 attempts"));
    assert_eq!(flaky.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_never_retried() {
    let broken = Arc::new(FlakyTool::new("broken", "file not found", usize::MAX));
    let (dispatcher, _events) = build(&test_config(), vec![broken.clone()]);

    let result = dispatcher.execute(&ToolUse::new("r3", "broken")).await;

    assert_eq!(result.content, "tool execution failed: file not found");
    assert_eq!(broken.calls(), 1);
}

#[tokio::test]
async fn test_events_mask_secrets() {
    let (dispatcher, mut events) = build(&test_config(), vec![Arc::new(EchoTool)]);
    let call = ToolUse::new("s1", "echo").with_input_map(
        json!({
            "msg": "hello",
            "api_key": {"nested": "sk-123"},
            "options": {"password": "hunter2", "verbose": true}
        })
        .as_object()
        .cloned()
        .unwrap(),
    );

    let result = dispatcher.execute(&call).await;

    assert_eq!(result.content, "hello");
    let events = drain(&mut events);
    let input = &events[0].input;
    assert_eq!(input["api_key"], json!(MASK));
    assert_eq!(input["options"]["password"], json!(MASK));
    assert_eq!(input["options"]["verbose"], json!(true));
    assert_eq!(input["msg"], json!("hello"));
}

#[tokio::test]
async fn test_event_output_truncation() {
    let mut config = test_config();
    config.events.max_output_chars = 100;
    let (dispatcher, mut events) = build(&config, vec![Arc::new(LongOutputTool(250))]);

    let result = dispatcher.execute(&ToolUse::new("t1", "long")).await;

    assert_eq!(result.content.len(), 250);
    let events = drain(&mut events);
    let done = events.last().unwrap();
    let output = done.output.as_deref().unwrap();
    assert_eq!(output, format!("{}{}", "x".repeat(100), TRUNCATION_MARKER));
    assert_eq!(done.metadata["truncated"], json!(true));
    assert_eq!(done.metadata["original_length"], json!(250));
    assert_eq!(done.metadata["shown_length"], json!(100));
}

#[tokio::test]
async fn test_panic_is_single_error_result() {
    let (dispatcher, mut events) = build(&test_config(), vec![Arc::new(PanicTool)]);

    let result = dispatcher.execute(&ToolUse::new("p1", "panic")).await;

    assert!(result.is_error);
    assert!(result.content.contains("unexpected state"));
    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, ToolEventType::Failed);
}

#[tokio::test]
async fn test_cache_serves_repeated_calls() {
    let mut config = test_config();
    config.cache.enabled = true;
    let counter = Arc::new(FlakyTool::new("count", "unused", 0));
    let (dispatcher, _events) = build(&config, vec![counter.clone()]);

    let first = dispatcher.execute(&ToolUse::new("c1", "count")).await;
    let second = dispatcher.execute(&ToolUse::new("c2", "count")).await;

    assert_eq!(first.content, second.content);
    assert_eq!(second.tool_use_id, "c2");
    assert_eq!(counter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_paces_calls() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.rate = Duration::from_millis(100);
    config.rate_limit.max_tokens = 1;
    let (dispatcher, _events) = build(&config, vec![Arc::new(EchoTool)]);

    let start = Instant::now();
    for i in 0..3 {
        let call = ToolUse::new(format!("l{}", i), "echo").with_input("msg", "x");
        assert!(!dispatcher.execute(&call).await.is_error);
    }

    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_batch_results_match_inputs() {
    let (dispatcher, _events) = build(&test_config(), vec![Arc::new(EchoTool)]);
    let calls: Vec<ToolUse> = (0..20)
        .map(|i| {
            let name = if i % 5 == 0 { "ghost" } else { "echo" };
            ToolUse::new(format!("b{}", i), name).with_input("msg", format!("m{}", i))
        })
        .collect();

    let results = dispatcher.execute_batch(&calls).await;

    assert_eq!(results.len(), calls.len());
    for (i, (call, result)) in calls.iter().zip(&results).enumerate() {
        assert_eq!(result.tool_use_id, call.id);
        if i % 5 == 0 {
            assert!(result.is_error);
        } else {
            assert_eq!(result.content, format!("m{}", i));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_processor_from_config() {
    let mut config = test_config();
    config.batch.batch_size = 4;
    let (dispatcher, _events) = build(&config, vec![Arc::new(EchoTool)]);
    let processor = BatchProcessor::from_config(Arc::new(dispatcher), &config.batch);
    let calls: Vec<ToolUse> = (0..10)
        .map(|i| ToolUse::new(format!("p{}", i), "echo").with_input("msg", i.to_string()))
        .collect();

    let results = processor.process(&CallContext::new(), &calls).await;

    let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]
    );
}
