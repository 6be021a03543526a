//! Conduit CLI - run batches of tool calls through the dispatch core

mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conduit_core::prelude::{
    AllowAll, BatchProcessor, CallContext, ConcurrentExecutor, ConduitConfig, Dispatcher,
    SecurityValidator, ToolPolicy, ToolResult, ToolUse, TracingObserver, standard_stack,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Conduit tool dispatch CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON array of tool uses and print the results
    Run {
        /// File containing `[{"id": .., "name": .., "input": {..}}, ..]`
        file: PathBuf,

        /// Configuration file (defaults to conduit.toml and CONDUIT_* variables)
        #[arg(short, long, env = "CONDUIT_CONFIG_PATH")]
        config: Option<PathBuf>,

        /// Use the paced batch processor instead of the worker pool
        #[arg(long)]
        batch: bool,

        /// Refuse these tools
        #[arg(long = "deny", value_name = "TOOL")]
        deny: Vec<String>,

        /// Seconds to wait for workers on shutdown
        #[arg(long, default_value_t = 5)]
        shutdown_timeout: u64,
    },
    /// List built-in tools
    Tools,
    /// Print the effective configuration
    Config {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Version information
    Version,
}

#[derive(Serialize)]
struct ToolInfo<'a> {
    name: &'a str,
    description: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            batch,
            deny,
            shutdown_timeout,
        } => {
            let config = load_config(config.as_deref())?;
            let calls = read_calls(&file)?;
            let results = run(
                &config,
                calls,
                security(deny),
                batch,
                Duration::from_secs(shutdown_timeout),
            )
            .await?;

            let failed = results.iter().filter(|r| r.is_error).count();
            tracing::info!(total = results.len(), failed, "Run complete");
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Tools => {
            let tools = tools::builtin_tools();
            let info: Vec<ToolInfo<'_>> = tools
                .iter()
                .map(|t| ToolInfo {
                    name: t.name(),
                    description: t.description(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Version => {
            println!("conduit {}", env!("CARGO_PKG_VERSION"));
            println!("conduit-core {}", conduit_core::VERSION);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ConduitConfig> {
    let config = match path {
        Some(path) => ConduitConfig::from_file(path)?,
        None => ConduitConfig::load()?,
    };
    Ok(config)
}

fn read_calls(path: &Path) -> Result<Vec<ToolUse>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn security(deny: Vec<String>) -> Arc<dyn SecurityValidator> {
    if deny.is_empty() {
        return Arc::new(AllowAll);
    }
    Arc::new(
        deny.into_iter()
            .fold(ToolPolicy::allow_all(), |policy, tool| policy.deny(tool)),
    )
}

async fn run(
    config: &ConduitConfig,
    calls: Vec<ToolUse>,
    security: Arc<dyn SecurityValidator>,
    batch: bool,
    shutdown_timeout: Duration,
) -> Result<Vec<ToolResult>> {
    let dispatcher = Dispatcher::builder()
        .config(config.dispatcher.clone())
        .security(security)
        .middleware_stack(standard_stack(config, Some(Arc::new(TracingObserver))))
        .build()?;
    dispatcher.register_all(tools::builtin_tools())?;
    let dispatcher = Arc::new(dispatcher);

    if batch {
        let ctx = CallContext::new();
        let interrupt = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling batch");
                interrupt.cancel();
            }
        });
        let processor = BatchProcessor::from_config(dispatcher, &config.batch);
        return Ok(processor.process(&ctx, &calls).await);
    }

    let executor = ConcurrentExecutor::from_config(dispatcher, &config.executor);
    let results = tokio::select! {
        results = submit_all(&executor, calls) => results,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, shutting down executor");
            executor.shutdown(shutdown_timeout).await?;
            anyhow::bail!("interrupted");
        }
    };
    executor.shutdown(shutdown_timeout).await?;
    Ok(results)
}

/// Submit every call at zero priority, waiting for queue space instead of
/// shedding, then collect results in input order
async fn submit_all(executor: &ConcurrentExecutor, calls: Vec<ToolUse>) -> Vec<ToolResult> {
    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        handles.push(executor.execute_with_priority(call, 0).await);
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.wait().await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::prelude::ExecutorConfig;
    use std::io::Write;

    fn calls_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "conduit", "run", "calls.json", "--batch", "--deny", "sleep",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                file, batch, deny, ..
            } => {
                assert_eq!(file, PathBuf::from("calls.json"));
                assert!(batch);
                assert_eq!(deny, vec!["sleep"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_read_calls() {
        let file = calls_file(r#"[{"id": "1", "name": "echo", "input": {"msg": "hi"}}]"#);

        let calls = read_calls(file.path()).unwrap();

        assert_eq!(calls, vec![ToolUse::new("1", "echo").with_input("msg", "hi")]);
    }

    #[test]
    fn test_read_calls_rejects_garbage() {
        let file = calls_file("{not json");

        let err = read_calls(file.path()).unwrap_err();

        assert!(err.to_string().contains("Failed to parse"));
    }

    fn sample_calls() -> Vec<ToolUse> {
        vec![
            ToolUse::new("a", "echo").with_input("msg", "one"),
            ToolUse::new("b", "sleep").with_input("ms", 5),
            ToolUse::new("c", "ghost"),
        ]
    }

    #[tokio::test]
    async fn test_run_with_executor() {
        let results = run(
            &ConduitConfig::default(),
            sample_calls(),
            security(Vec::new()),
            false,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.tool_use_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(results[0].content, "one");
        assert_eq!(results[1].content, "slept 5ms");
        assert!(results[2].is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_larger_than_queue() {
        let mut config = ConduitConfig::default();
        config.executor = ExecutorConfig::new(1).with_queue_size(2);
        let calls: Vec<ToolUse> = (0..20)
            .map(|i| ToolUse::new(i.to_string(), "sleep").with_input("ms", 10))
            .collect();

        let results = run(&config, calls, security(Vec::new()), false, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.content == "slept 10ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_batch_with_denied_tool() {
        let results = run(
            &ConduitConfig::default(),
            sample_calls(),
            security(vec!["sleep".to_string()]),
            true,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "one");
        assert!(results[1].content.starts_with("permission denied"));
    }
}
