//! Circuit breakers.
//!
//! A breaker watches call outcomes for one endpoint and short-circuits
//! calls once the failure rate crosses its threshold. After the open period
//! a limited number of trial calls decide whether it closes again.

use laneway_core::Clock;
use laneway_policy::{CircuitBreakerConfig, CircuitBreakerPolicy};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::cache::ExpiringMap;
use crate::registry::{FactoryRegistry, RegistryError};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    /// Calls flow; outcomes are recorded
    Closed,
    /// Calls are refused until the open period ends
    Open,
    /// A few trial calls are admitted
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker guarding one target
pub trait CircuitBreaker: Send + Sync {
    /// Whether a call may proceed
    ///
    /// A granted half-open trial stays taken until the call is reported
    /// through `on_success`, `on_error` or `release`.
    fn try_acquire(&self) -> bool;

    /// Record a successful call
    fn on_success(&self);

    /// Record a failed call
    fn on_error(&self);

    /// Give back an admission whose outcome does not count
    fn release(&self);

    /// Current state
    fn state(&self) -> CircuitState;
}

/// Builds breakers for a policy
pub trait CircuitBreakerFactory: Send + Sync {
    /// New breaker enforcing `policy`
    fn create(
        &self,
        policy: &CircuitBreakerPolicy,
        clock: Arc<dyn Clock>,
    ) -> Arc<dyn CircuitBreaker>;
}

#[derive(Debug)]
struct Counts {
    state: CircuitState,
    // true marks a failure
    window: VecDeque<bool>,
    failures: u32,
    opened_at: u64,
    trials_granted: u32,
    trials_passed: u32,
}

impl Counts {
    fn record(&mut self, failed: bool, size: usize) {
        self.window.push_back(failed);
        if failed {
            self.failures += 1;
        }
        while self.window.len() > size {
            if self.window.pop_front() == Some(true) {
                self.failures -= 1;
            }
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        f64::from(self.failures) * 100.0 / self.window.len() as f64
    }

    fn open(&mut self, now: u64) {
        self.state = CircuitState::Open;
        self.opened_at = now;
        self.trials_granted = 0;
        self.trials_passed = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.window.clear();
        self.failures = 0;
        self.trials_granted = 0;
        self.trials_passed = 0;
    }
}

/// Count-based sliding window breaker
pub struct CountBreaker {
    policy: CircuitBreakerPolicy,
    clock: Arc<dyn Clock>,
    counts: Mutex<Counts>,
}

impl CountBreaker {
    /// Create a closed breaker
    #[must_use]
    pub fn new(policy: CircuitBreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        let counts = Counts {
            state: CircuitState::Closed,
            window: VecDeque::with_capacity(policy.sliding_window_size as usize),
            failures: 0,
            opened_at: 0,
            trials_granted: 0,
            trials_passed: 0,
        };
        Self {
            policy,
            clock,
            counts: Mutex::new(counts),
        }
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_elapsed(&self, counts: &Counts, now: u64) -> bool {
        now.saturating_sub(counts.opened_at) >= self.policy.wait_in_open_ms
    }
}

impl CircuitBreaker for CountBreaker {
    fn try_acquire(&self) -> bool {
        let now = self.clock.now_millis();
        let mut counts = self.counts();
        if counts.state == CircuitState::Open {
            if !self.open_elapsed(&counts, now) {
                return false;
            }
            counts.state = CircuitState::HalfOpen;
            tracing::debug!("circuit breaker half-open");
        }
        match counts.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if counts.trials_granted < self.policy.permitted_calls_in_half_open {
                    counts.trials_granted += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    fn on_success(&self) {
        let mut counts = self.counts();
        match counts.state {
            CircuitState::Closed => {
                counts.record(false, self.policy.sliding_window_size as usize);
            }
            CircuitState::HalfOpen => {
                counts.trials_passed += 1;
                if counts.trials_passed >= self.policy.permitted_calls_in_half_open {
                    counts.close();
                    tracing::info!("circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_error(&self) {
        let now = self.clock.now_millis();
        let mut counts = self.counts();
        match counts.state {
            CircuitState::Closed => {
                counts.record(true, self.policy.sliding_window_size as usize);
                let calls = counts.window.len() as u32;
                let rate = counts.failure_rate();
                if calls >= self.policy.minimum_calls.max(1)
                    && rate >= self.policy.failure_rate_threshold
                {
                    counts.open(now);
                    tracing::warn!(
                        failure_rate = rate,
                        calls,
                        wait_ms = self.policy.wait_in_open_ms,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                counts.open(now);
                tracing::warn!("circuit breaker trial failed, reopened");
            }
            CircuitState::Open => {}
        }
    }

    fn release(&self) {
        let mut counts = self.counts();
        if counts.state == CircuitState::HalfOpen {
            counts.trials_granted = counts.trials_granted.saturating_sub(1);
        }
    }

    fn state(&self) -> CircuitState {
        let now = self.clock.now_millis();
        let counts = self.counts();
        if counts.state == CircuitState::Open && self.open_elapsed(&counts, now) {
            CircuitState::HalfOpen
        } else {
            counts.state
        }
    }
}

/// Factory for `count` breakers
#[derive(Debug, Clone, Copy, Default)]
pub struct CountBreakerFactory;

impl CircuitBreakerFactory for CountBreakerFactory {
    fn create(
        &self,
        policy: &CircuitBreakerPolicy,
        clock: Arc<dyn Clock>,
    ) -> Arc<dyn CircuitBreaker> {
        Arc::new(CountBreaker::new(policy.clone(), clock))
    }
}

/// Registry holding the built-in breaker factories
#[must_use]
pub fn breaker_registry() -> FactoryRegistry<dyn CircuitBreakerFactory> {
    let mut registry: FactoryRegistry<dyn CircuitBreakerFactory> = FactoryRegistry::new();
    registry.replace("count", Arc::new(CountBreakerFactory));
    registry
}

struct KeyedBreaker {
    version: u64,
    breaker: Arc<dyn CircuitBreaker>,
}

/// Breakers keyed per endpoint, with idle expiry
pub struct CircuitBreakerBank {
    breakers: Arc<ExpiringMap<KeyedBreaker>>,
    registry: FactoryRegistry<dyn CircuitBreakerFactory>,
    default_factory: Arc<dyn CircuitBreakerFactory>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerBank {
    /// Create a bank using `config` for the default type and state retention
    ///
    /// # Errors
    ///
    /// Returns error if the configured default type is not registered
    pub fn new(
        config: &CircuitBreakerConfig,
        registry: FactoryRegistry<dyn CircuitBreakerFactory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        let default_factory = registry.require(&config.breaker_type)?;
        Ok(Self {
            breakers: Arc::new(ExpiringMap::new(
                config.clean_interval,
                config.expire_time,
                Arc::clone(&clock),
            )),
            registry,
            default_factory,
            clock,
        })
    }

    /// Bank with the built-in breakers
    ///
    /// # Errors
    ///
    /// Returns error if the configured default type is not built in
    pub fn with_defaults(
        config: &CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        Self::new(config, breaker_registry(), clock)
    }

    /// Breaker for `key` under `policy`, rebuilt when the policy version changes
    #[must_use]
    pub fn breaker(
        &self,
        key: &str,
        policy: &CircuitBreakerPolicy,
        version: u64,
    ) -> Arc<dyn CircuitBreaker> {
        let keyed = self.breakers.get_fresh_or_insert_with(
            key,
            |current| current.version == version,
            || KeyedBreaker {
                version,
                breaker: self.factory_for(policy).create(policy, Arc::clone(&self.clock)),
            },
        );
        Arc::clone(&keyed.breaker)
    }

    /// Drop expired keys now
    pub fn sweep(&self) -> usize {
        self.breakers.sweep()
    }

    /// Sweep expired keys every `clean_interval` until the bank is dropped
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.breakers.spawn_sweeper()
    }

    /// Number of keys with live breaker state
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no key holds breaker state
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn factory_for(&self, policy: &CircuitBreakerPolicy) -> Arc<dyn CircuitBreakerFactory> {
        match policy.breaker_type.as_deref() {
            None => Arc::clone(&self.default_factory),
            Some(type_name) => self.registry.get(type_name).unwrap_or_else(|| {
                tracing::warn!(breaker_type = type_name, "unknown breaker type, using default");
                Arc::clone(&self.default_factory)
            }),
        }
    }
}
