//! Token bucket rate limiter
//!
//! The bucket starts full. A background task adds one token every `rate`
//! interval and drops it when the bucket is already at capacity. Consumers
//! wait for a token or give up when their context ends; waiters are served in
//! the semaphore's FIFO order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::context::{CallContext, CancelReason};

/// Token bucket shared by everything that holds a clone of its `Arc`
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    rate: Duration,
    max_tokens: usize,
    refill: JoinHandle<()>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("available", &self.available())
            .field("max_tokens", &self.max_tokens)
            .field("rate", &self.rate)
            .finish()
    }
}

impl RateLimiter {
    /// Create a pre-filled bucket refilled with one token per `rate`.
    ///
    /// Must be called inside a tokio runtime. `max_tokens` is clamped to at
    /// least 1 and `rate` to at least 1ms.
    pub fn new(rate: Duration, max_tokens: usize) -> Self {
        let max_tokens = max_tokens.max(1);
        let rate = rate.max(Duration::from_millis(1));
        let tokens = Arc::new(Semaphore::new(max_tokens));

        let bucket = Arc::clone(&tokens);
        let refill = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + rate, rate);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // single refiller, so check-then-add cannot overshoot
                if bucket.available_permits() < max_tokens {
                    bucket.add_permits(1);
                }
            }
        });

        tracing::debug!(rate_ms = rate.as_millis() as u64, max_tokens, "Rate limiter started");

        Self {
            tokens,
            rate,
            max_tokens,
            refill,
        }
    }

    /// Wait for one token, or return why the context ended first
    pub async fn acquire(&self, ctx: &CallContext) -> Result<(), CancelReason> {
        tokio::select! {
            biased;
            reason = ctx.done() => Err(reason),
            permit = self.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_) => Err(CancelReason::Cancelled),
            },
        }
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Tokens currently in the bucket
    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    /// Bucket capacity
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Refill interval
    pub fn rate(&self) -> Duration {
        self.rate
    }

    /// Stop refilling and fail all current and future waiters
    pub fn stop(&self) {
        self.refill.abort();
        self.tokens.close();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill.abort();
    }
}
