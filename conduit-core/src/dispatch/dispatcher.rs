//! Dispatcher: the single point where a tool name becomes an executed call

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::AbortOnDropHandle;

use crate::config::DispatcherConfig;
use crate::context::{CallContext, CancelReason};
use crate::error::{ConduitError, Result};
use crate::middleware::{Endpoint, Middleware, Next, panic_message};
use crate::tools::{
    AllowAll, BoxedTool, Registry, SecurityValidator, ToolError, ToolRegistry, ToolResult, ToolUse,
};

#[derive(Debug, Clone, Copy)]
struct Settings {
    max_parallel: usize,
    timeout: Option<Duration>,
}

impl From<&DispatcherConfig> for Settings {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            max_parallel: config.max_parallel.max(1),
            timeout: non_zero(config.timeout),
        }
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

/// Resolves, checks, validates and executes tool calls through the
/// installed middleware pipeline.
///
/// Every call yields exactly one [`ToolResult`]; failures are reported as
/// error results, never as `Err`.
pub struct Dispatcher {
    shared: Arc<Shared>,
}

/// State reachable from spawned batch items
struct Shared {
    registry: Arc<dyn Registry>,
    security: Arc<dyn SecurityValidator>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    settings: RwLock<Settings>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("middleware", &self.middleware_names())
            .field("settings", &*self.shared.settings.read())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with default settings
    pub fn new(registry: Arc<dyn Registry>, security: Arc<dyn SecurityValidator>) -> Self {
        Self::from_config(registry, security, &DispatcherConfig::default())
    }

    /// Create a dispatcher from configuration
    pub fn from_config(
        registry: Arc<dyn Registry>,
        security: Arc<dyn SecurityValidator>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                security,
                middleware: RwLock::new(Vec::new()),
                settings: RwLock::new(Settings::from(config)),
            }),
        }
    }

    /// Create a builder
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Append a middleware; the first added is the outermost
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        tracing::debug!(middleware = middleware.name(), "Middleware added");
        self.shared.middleware.write().push(middleware);
    }

    /// Names of installed middleware, outermost first
    pub fn middleware_names(&self) -> Vec<String> {
        self.shared
            .middleware
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Set the parallelism bound for batch calls (clamped to at least 1)
    pub fn set_max_parallel(&self, max_parallel: usize) {
        self.shared.settings.write().max_parallel = max_parallel.max(1);
    }

    /// Parallelism bound for batch calls
    pub fn max_parallel(&self) -> usize {
        self.shared.settings.read().max_parallel
    }

    /// Set the per-call timeout; zero disables it
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.settings.write().timeout = non_zero(timeout);
    }

    /// Per-call timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.shared.settings.read().timeout
    }

    /// Register a tool
    pub fn register(&self, tool: BoxedTool) -> Result<()> {
        let name = tool.name().to_string();
        self.shared.registry.register(tool)?;
        tracing::debug!(tool = %name, "Tool registered");
        Ok(())
    }

    /// Register several tools, stopping at the first failure
    pub fn register_all(&self, tools: impl IntoIterator<Item = BoxedTool>) -> Result<()> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Check if a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.shared.registry.has(name)
    }

    /// All registered tools
    pub fn list_tools(&self) -> Vec<BoxedTool> {
        self.shared.registry.list()
    }

    /// Remove every registered tool
    pub fn clear(&self) {
        self.shared.registry.clear();
    }

    /// Execute one call under a fresh context
    pub async fn execute(&self, tool_use: &ToolUse) -> ToolResult {
        self.execute_with_context(&CallContext::new(), tool_use).await
    }

    /// Execute one call under `ctx`
    pub async fn execute_with_context(&self, ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
        self.shared.execute(ctx, tool_use).await
    }

    /// Execute several calls under a fresh context
    pub async fn execute_batch(&self, tool_uses: &[ToolUse]) -> Vec<ToolResult> {
        self.execute_batch_with_context(&CallContext::new(), tool_uses)
            .await
    }

    /// Execute several calls under `ctx`, at most `max_parallel` at a time.
    ///
    /// The i-th result always answers the i-th call. Calls still waiting for
    /// a slot when `ctx` ends receive a cancellation result.
    pub async fn execute_batch_with_context(
        &self,
        ctx: &CallContext,
        tool_uses: &[ToolUse],
    ) -> Vec<ToolResult> {
        let max_parallel = self.max_parallel();

        if max_parallel <= 1 || tool_uses.len() <= 1 {
            let mut results = Vec::with_capacity(tool_uses.len());
            for tool_use in tool_uses {
                let result = match ctx.cancel_reason() {
                    Some(reason) => {
                        ToolResult::from_error(&tool_use.id, &ToolError::cancelled(reason))
                    }
                    None => self.execute_with_context(ctx, tool_use).await,
                };
                results.push(result);
            }
            return results;
        }

        let gate = Arc::new(Semaphore::new(max_parallel));
        let handles: Vec<AbortOnDropHandle<ToolResult>> = tool_uses
            .iter()
            .map(|tool_use| {
                let shared = Arc::clone(&self.shared);
                let gate = Arc::clone(&gate);
                let ctx = ctx.clone();
                let tool_use = tool_use.clone();
                AbortOnDropHandle::new(tokio::spawn(async move {
                    let permit = tokio::select! {
                        biased;
                        reason = ctx.done() => Err(reason),
                        permit = gate.acquire_owned() => {
                            permit.map_err(|_| CancelReason::Cancelled)
                        }
                    };
                    match permit {
                        Ok(_permit) => shared.execute(&ctx, &tool_use).await,
                        Err(reason) => {
                            ToolResult::from_error(&tool_use.id, &ToolError::cancelled(reason))
                        }
                    }
                }))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (handle, tool_use) in handles.into_iter().zip(tool_uses) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    tracing::error!(
                        tool = %tool_use.name,
                        tool_use_id = %tool_use.id,
                        panic = %message,
                        "Panic in batch item"
                    );
                    ToolResult::from_error(
                        &tool_use.id,
                        &ToolError::Panic {
                            tool: tool_use.name.clone(),
                            message,
                        },
                    )
                }
                Err(_) => ToolResult::from_error(
                    &tool_use.id,
                    &ToolError::Cancelled(CancelReason::Cancelled),
                ),
            };
            results.push(result);
        }
        results
    }
}

impl Shared {
    fn timeout(&self) -> Option<Duration> {
        self.settings.read().timeout
    }

    async fn execute(&self, ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
        if let Err(reason) = tool_use.validate() {
            return ToolResult::from_error(&tool_use.id, &ToolError::InvalidRequest(reason));
        }

        let ctx = match self.timeout() {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };

        // snapshot so configuration changes never block running calls
        let chain = self.middleware.read().clone();
        let core = CoreStep {
            registry: self.registry.as_ref(),
            security: self.security.as_ref(),
        };

        Next::new(&chain, &core).run(&ctx, tool_use).await
    }
}

/// Innermost pipeline step: lookup, permission, validation, execution
struct CoreStep<'a> {
    registry: &'a dyn Registry,
    security: &'a dyn SecurityValidator,
}

#[async_trait]
impl Endpoint for CoreStep<'_> {
    async fn call(&self, ctx: &CallContext, tool_use: &ToolUse) -> ToolResult {
        let fail = |error: ToolError| ToolResult::from_error(&tool_use.id, &error);

        let Ok(tool) = self.registry.get(&tool_use.name) else {
            return fail(ToolError::NotFound(tool_use.name.clone()));
        };

        if let Err(denied) = self
            .security
            .check_permission(&tool_use.name, &tool_use.input)
        {
            return fail(ToolError::PermissionDenied {
                tool: tool_use.name.clone(),
                reason: denied.0,
            });
        }

        if let Err(invalid) = tool.validate(&tool_use.input) {
            return fail(ToolError::Validation(invalid.to_string()));
        }

        if let Some(reason) = ctx.cancel_reason() {
            return fail(ToolError::cancelled(reason));
        }

        tokio::select! {
            biased;
            reason = ctx.done() => fail(ToolError::cancelled(reason)),
            output = tool.execute(ctx, &tool_use.input) => match output {
                Ok(content) => ToolResult::success(&tool_use.id, content),
                Err(e) => fail(ToolError::Execution(format!("{:#}", e))),
            },
        }
    }
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder {
    registry: Option<Arc<dyn Registry>>,
    security: Option<Arc<dyn SecurityValidator>>,
    middleware: Vec<Arc<dyn Middleware>>,
    tools: Vec<BoxedTool>,
    config: DispatcherConfig,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    /// Create a builder; unset collaborators default to an empty
    /// [`ToolRegistry`] and [`AllowAll`]
    pub fn new() -> Self {
        Self {
            registry: None,
            security: None,
            middleware: Vec::new(),
            tools: Vec::new(),
            config: DispatcherConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn security(mut self, security: Arc<dyn SecurityValidator>) -> Self {
        self.security = Some(security);
        self
    }

    /// Append a middleware
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Append several middleware, preserving their order
    pub fn middleware_stack(mut self, stack: impl IntoIterator<Item = Arc<dyn Middleware>>) -> Self {
        self.middleware.extend(stack);
        self
    }

    /// Register a tool at build time
    pub fn tool(mut self, tool: BoxedTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.config.max_parallel = max_parallel;
        self
    }

    /// Per-call timeout; zero disables it
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the dispatcher
    ///
    /// # Errors
    ///
    /// Returns an error if a tool fails to register.
    pub fn build(self) -> Result<Dispatcher> {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ToolRegistry::new()));
        let security = self.security.unwrap_or_else(|| Arc::new(AllowAll));

        let dispatcher = Dispatcher::from_config(registry, security, &self.config);
        dispatcher
            .register_all(self.tools)
            .map_err(|e| ConduitError::Configuration(format!("Failed to build dispatcher: {}", e)))?;
        for middleware in self.middleware {
            dispatcher.add_middleware(middleware);
        }
        Ok(dispatcher)
    }
}
