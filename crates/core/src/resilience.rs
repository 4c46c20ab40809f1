//! # Resilience
//!
//! Circuit breaker protecting calls to external AI and deploy providers.
//! One named instance per provider; state is shared across every concurrent
//! call targeting that provider.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through, failures are counted
    Closed,
    /// Requests are rejected immediately
    Open,
    /// Probing: successes close the circuit, any failure reopens it
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing again
    pub success_threshold: u32,
    /// How long to stay open before allowing a probe
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Error surface of [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum BreakerError {
    /// Rejected without invoking the wrapped action
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },
    /// The wrapped action itself failed
    #[error(transparent)]
    Inner(#[from] anyhow::Error),
}

/// Observer invoked on every state transition: `(name, from, to)`.
pub type TransitionCallback = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug)]
struct BreakerState {
    current: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker around a fallible async action.
///
/// `execute` is the only entry point; it checks the state, runs the action,
/// and routes the outcome. Every transition resets both counters.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    on_transition: Option<TransitionCallback>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                current: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
            on_transition: None,
        }
    }

    /// Attach a transition observer
    pub fn with_transition_callback(mut self, callback: TransitionCallback) -> Self {
        self.on_transition = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `action` under breaker protection.
    ///
    /// While open and inside the recovery window this rejects with
    /// [`BreakerError::Open`] without invoking the action. The first call
    /// after the recovery timeout transitions to half-open and does invoke it.
    pub async fn execute<F, Fut, T>(&self, action: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.can_execute().await {
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }

        match action().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(BreakerError::Inner(err))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.current
    }

    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.failure_count
    }

    /// Force the breaker back to closed (test/operator escape hatch)
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        if state.current != CircuitState::Closed {
            self.transition(&mut state, CircuitState::Closed);
        } else {
            state.failure_count = 0;
            state.success_count = 0;
        }
        state.last_failure = None;
    }

    async fn can_execute(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match state.last_failure {
                Some(at) if at.elapsed() >= self.config.recovery_timeout => {
                    self.transition(&mut state, CircuitState::HalfOpen);
                    true
                }
                _ => false,
            },
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;
        match state.current {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.last_failure = Some(Instant::now());
        match state.current {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.current;
        state.current = to;
        state.failure_count = 0;
        state.success_count = 0;
        tracing::info!(
            breaker = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            "circuit breaker transition"
        );
        if let Some(callback) = &self.on_transition {
            callback(&self.name, from, to);
        }
    }
}
