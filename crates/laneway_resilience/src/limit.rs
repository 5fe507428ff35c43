//! Rate limiters.
//!
//! Admission is a synchronous, non-blocking check. Limiters hold per-key
//! state behind their own lock; the [`RateLimiterBank`] keeps one limiter per
//! key and lets idle keys expire according to [`RateLimiterConfig`].

use laneway_core::{Clock, RejectKind, Rejection};
use laneway_policy::{RateLimitPolicy, RateLimiterConfig};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::cache::ExpiringMap;
use crate::registry::{FactoryRegistry, RegistryError};

/// Admission gate for one key
pub trait RateLimiter: Send + Sync {
    /// Take one permit if available
    fn try_acquire(&self) -> bool;

    /// Policy this limiter enforces
    fn policy(&self) -> &RateLimitPolicy;
}

/// Builds limiters for a policy
pub trait RateLimiterFactory: Send + Sync {
    /// New limiter enforcing `policy`
    fn create(&self, policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter>;
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: u64,
}

/// Token bucket refilled continuously at `permits / window_ms`
///
/// The bucket starts full, so a burst of `permits` calls is admitted at once.
pub struct TokenBucketLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    bucket: Mutex<Bucket>,
}

impl TokenBucketLimiter {
    /// Create a full bucket
    #[must_use]
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let bucket = Bucket {
            tokens: policy.permits as f64,
            last_refill: clock.now_millis(),
        };
        Self {
            policy,
            clock,
            bucket: Mutex::new(bucket),
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn try_acquire(&self) -> bool {
        let now = self.clock.now_millis();
        let capacity = self.policy.permits as f64;
        let window = self.policy.window_ms.max(1) as f64;

        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_sub(bucket.last_refill) as f64;
        bucket.tokens = (bucket.tokens + elapsed * capacity / window).min(capacity);
        bucket.last_refill = bucket.last_refill.max(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

#[derive(Debug)]
struct Window {
    start: u64,
    used: u64,
}

/// At most `permits` calls per aligned `window_ms` window
pub struct FixedWindowLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    window: Mutex<Window>,
}

impl FixedWindowLimiter {
    /// Create a limiter whose first window starts now
    #[must_use]
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let window = Window {
            start: clock.now_millis(),
            used: 0,
        };
        Self {
            policy,
            clock,
            window: Mutex::new(window),
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn try_acquire(&self) -> bool {
        let now = self.clock.now_millis();
        let length = self.policy.window_ms.max(1);

        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_sub(window.start);
        if elapsed >= length {
            window.start = now - elapsed % length;
            window.used = 0;
        }
        if window.used < self.policy.permits {
            window.used += 1;
            true
        } else {
            false
        }
    }

    fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

/// Factory for `tokenBucket` limiters
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucketLimiterFactory;

impl RateLimiterFactory for TokenBucketLimiterFactory {
    fn create(&self, policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter> {
        Arc::new(TokenBucketLimiter::new(policy.clone(), clock))
    }
}

/// Factory for `fixedWindow` limiters
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindowLimiterFactory;

impl RateLimiterFactory for FixedWindowLimiterFactory {
    fn create(&self, policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter> {
        Arc::new(FixedWindowLimiter::new(policy.clone(), clock))
    }
}

/// Registry holding the built-in limiter factories
#[must_use]
pub fn limiter_registry() -> FactoryRegistry<dyn RateLimiterFactory> {
    let mut registry: FactoryRegistry<dyn RateLimiterFactory> = FactoryRegistry::new();
    registry.replace("tokenBucket", Arc::new(TokenBucketLimiterFactory));
    registry.replace("fixedWindow", Arc::new(FixedWindowLimiterFactory));
    registry
}

struct KeyedLimiter {
    version: u64,
    limiter: Arc<dyn RateLimiter>,
}

/// Limiters keyed by request attributes, with idle expiry
pub struct RateLimiterBank {
    limiters: Arc<ExpiringMap<KeyedLimiter>>,
    registry: FactoryRegistry<dyn RateLimiterFactory>,
    default_factory: Arc<dyn RateLimiterFactory>,
    clock: Arc<dyn Clock>,
}

impl RateLimiterBank {
    /// Create a bank using `config` for the default type and state retention
    ///
    /// # Errors
    ///
    /// Returns error if the configured default type is not registered
    pub fn new(
        config: &RateLimiterConfig,
        registry: FactoryRegistry<dyn RateLimiterFactory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        let default_factory = registry.require(&config.limiter_type)?;
        Ok(Self {
            limiters: Arc::new(ExpiringMap::new(
                config.clean_interval,
                config.expire_time,
                Arc::clone(&clock),
            )),
            registry,
            default_factory,
            clock,
        })
    }

    /// Bank with the built-in limiters
    ///
    /// # Errors
    ///
    /// Returns error if the configured default type is not built in
    pub fn with_defaults(
        config: &RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        Self::new(config, limiter_registry(), clock)
    }

    /// Admit one call for `key` under `policy`
    ///
    /// A key's limiter is rebuilt when the policy version changes.
    ///
    /// # Errors
    ///
    /// Returns a rate-limited rejection when no permit is available
    pub fn try_acquire(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        version: u64,
    ) -> Result<(), Rejection> {
        let keyed = self.limiters.get_fresh_or_insert_with(
            key,
            |current| current.version == version,
            || KeyedLimiter {
                version,
                limiter: self.factory_for(policy).create(policy, Arc::clone(&self.clock)),
            },
        );
        if keyed.limiter.try_acquire() {
            Ok(())
        } else {
            tracing::warn!(key, permits = policy.permits, "rate limit exceeded");
            Err(Rejection::new(
                RejectKind::RateLimited,
                format!("rate limit exceeded for {}", key),
            ))
        }
    }

    /// Drop expired keys now
    pub fn sweep(&self) -> usize {
        self.limiters.sweep()
    }

    /// Sweep expired keys every `clean_interval` until the bank is dropped
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.limiters.spawn_sweeper()
    }

    /// Number of keys with live limiter state
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no key holds limiter state
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    fn factory_for(&self, policy: &RateLimitPolicy) -> Arc<dyn RateLimiterFactory> {
        match policy.limiter_type.as_deref() {
            None => Arc::clone(&self.default_factory),
            Some(type_name) => self.registry.get(type_name).unwrap_or_else(|| {
                tracing::warn!(limiter_type = type_name, "unknown limiter type, using default");
                Arc::clone(&self.default_factory)
            }),
        }
    }
}
