//! Fixed-window rate limiter
//!
//! One counter per caller at `{prefix}{identifier}`. The counter is created
//! with an expiry of one window; when it expires the caller's quota resets.

use std::sync::Arc;
use std::time::Duration;

use parish_chat_config::RateLimitConfig;
use parish_chat_core::{Clock, FailureReason, KeyValueStore, SystemClock};

/// Quota applied to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_millis(config.window_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix ms at which the current window ends
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    fn full_quota(policy: &RateLimitPolicy, now_ms: i64) -> Self {
        Self {
            allowed: true,
            remaining: policy.max_requests,
            reset_at_ms: now_ms + policy.window.as_millis() as i64,
        }
    }

    /// Milliseconds until the window resets, for `Retry-After`
    pub fn retry_after_ms(&self, now_ms: i64) -> u64 {
        (self.reset_at_ms - now_ms).max(0) as u64
    }
}

pub struct RateLimiter {
    store: Option<Arc<dyn KeyValueStore>>,
    policy: RateLimitPolicy,
    key_prefix: String,
    enabled: bool,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            policy: RateLimitPolicy::from(config),
            key_prefix: config.key_prefix.clone(),
            enabled: config.enabled,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Check and count a request under the configured policy
    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_with(identifier, &self.policy).await
    }

    /// Check and count a request. Store failures allow the request with a full
    /// quota; a malformed counter is deleted and the request counted afresh.
    pub async fn check_with(&self, identifier: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::full_quota(policy, self.clock.now_ms());
        }

        let mut result = self.try_check(identifier, policy).await;
        if let Err(reason @ FailureReason::MalformedEntry { .. }) = &result {
            tracing::warn!(identifier = %identifier, error = %reason, "Resetting malformed rate limit counter");
            result = match self.reset(identifier).await {
                Ok(()) => self.try_check(identifier, policy).await,
                Err(e) => Err(e),
            };
        }

        match result {
            Ok(decision) => decision,
            Err(reason) => {
                if !matches!(reason, FailureReason::StoreDisabled) {
                    tracing::warn!(
                        identifier = %identifier,
                        error = %reason,
                        "Rate limiter unavailable, allowing request"
                    );
                }
                RateLimitDecision::full_quota(policy, self.clock.now_ms())
            },
        }
    }

    async fn reset(&self, identifier: &str) -> Result<(), FailureReason> {
        let store = self.store.as_ref().ok_or(FailureReason::StoreDisabled)?;
        store.del(&format!("{}{}", self.key_prefix, identifier)).await?;
        Ok(())
    }

    pub async fn try_check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, FailureReason> {
        let store = self.store.as_ref().ok_or(FailureReason::StoreDisabled)?;
        let key = format!("{}{}", self.key_prefix, identifier);
        let now = self.clock.now_ms();
        let window_ms = policy.window.as_millis() as i64;

        let current = match store.get(&key).await? {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| FailureReason::malformed(&key, e))?,
            None => 0,
        };

        if current >= policy.max_requests {
            let reset_at_ms = match store.ttl(&key).await? {
                Some(ttl) => now + ttl.as_millis() as i64,
                None => now + window_ms,
            };
            tracing::info!(identifier = %identifier, count = current, "Rate limit exceeded");
            metrics::counter!("rate_limit_rejections_total").increment(1);
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms,
            });
        }

        let count = store.incr(&key, policy.window).await?;
        let reset_at_ms = if count == 1 {
            now + window_ms
        } else {
            store
                .ttl(&key)
                .await?
                .map_or(now + window_ms, |ttl| now + ttl.as_millis() as i64)
        };

        // concurrent callers may push the counter past the limit between GET and INCR
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        Ok(RateLimitDecision {
            allowed: count <= policy.max_requests,
            remaining: policy.max_requests.saturating_sub(count),
            reset_at_ms,
        })
    }
}
