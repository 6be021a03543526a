//! Result cache keyed by tool name and input

use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{Middleware, Next};
use crate::context::CallContext;
use crate::tools::{ToolResult, ToolUse};

const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Serves repeated calls from a TTL cache.
///
/// Only successful results are stored. A hit is returned under the id of the
/// current call, not the one that populated the entry.
pub struct CacheMiddleware {
    cache: Cache<String, String>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for CacheMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMiddleware")
            .field("ttl", &self.ttl)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl CacheMiddleware {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache bounded to `max_entries`
    pub fn with_capacity(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key for a call: hex SHA-256 over the tool name, a NUL separator
    /// and the input JSON
    pub fn cache_key(tool_use: &ToolUse) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tool_use.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(tool_use.input_json().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Approximate number of live entries
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    /// Check if the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Lookups served from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that fell through to the tool
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    fn name(&self) -> &str {
        "cache"
    }

    async fn handle(&self, ctx: &CallContext, tool_use: &ToolUse, next: Next<'_>) -> ToolResult {
        let key = Self::cache_key(tool_use);

        if let Some(content) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(tool = %tool_use.name, tool_use_id = %tool_use.id, "cache hit");
            return ToolResult::success(&tool_use.id, content);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = next.run(ctx, tool_use).await;
        if !result.is_error {
            self.cache.insert(key, result.content.clone()).await;
        }
        result
    }
}
