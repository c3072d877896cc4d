//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: reset_timeout elapsed since the Open transition
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (reset clock restarts)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering recovering backend)
//! - Every transition bumps a generation; outcomes admitted under an older
//!   generation are discarded, so a late reply can never settle a newer trial

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// Capacity of the state-change notification channel.
const EVENT_CAPACITY: usize = 64;

/// Circuit breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker tuning for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the circuit.
    pub max_failures: u32,
    /// Upper bound on a single call.
    pub timeout: Duration,
    /// Cool-down between opening and the Half-Open trial.
    pub reset_timeout: Duration,
    /// Replace classified failures with a fallback value.
    pub fallback_on_failure: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout: Duration::from_millis(10_000),
            reset_timeout: Duration::from_millis(30_000),
            fallback_on_failure: false,
        }
    }
}

/// Notification emitted on every phase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// Name of the breaker (the logical service name).
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    /// Failure count at the moment of the transition.
    pub failures: u32,
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
}

/// Classified failure of a guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without reaching the backend.
    #[error("circuit is open")]
    Open,

    /// The call exceeded the configured timeout.
    #[error("call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The operation itself failed.
    #[error("{0}")]
    Failed(E),
}

/// How an admitted call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// The caller stopped awaiting the call.
    Abandoned,
}

struct BreakerState {
    phase: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    /// Bumped on every transition.
    generation: u64,
    /// Attempt id of the in-flight Half-Open trial.
    trial: Option<u64>,
    next_attempt: u64,
}

/// Circuit breaker guarding one backend.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    events: broadcast::Sender<StateChange>,
}

impl CircuitBreaker {
    /// Create a breaker with its own notification channel.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_notifier(name, config, events)
    }

    /// Create a breaker that publishes transitions on a shared channel.
    pub fn with_notifier(
        name: impl Into<String>,
        config: BreakerConfig,
        events: broadcast::Sender<StateChange>,
    ) -> Self {
        let name = name.into();
        tracing::debug!(
            breaker = %name,
            max_failures = config.max_failures,
            timeout_ms = config.timeout.as_millis() as u64,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );
        metrics::record_breaker_state(&name, CircuitState::Closed);

        Self {
            name,
            config,
            state: Mutex::new(BreakerState {
                phase: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                generation: 0,
                trial: None,
                next_attempt: 0,
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current phase as last committed.
    pub fn state(&self) -> CircuitState {
        self.state.lock().phase
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: state.phase,
            failures: state.failures,
        }
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Run `operation` under the breaker.
    ///
    /// The operation is only constructed once the call is admitted, so a
    /// rejected call never reaches the backend. A call that outlives
    /// `timeout` is dropped and counted as a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.admit() else {
            metrics::record_breaker_rejection(&self.name);
            return Err(BreakerError::Open);
        };

        match time::timeout(self.config.timeout, operation()).await {
            Ok(Ok(value)) => {
                permit.settle(Outcome::Success);
                Ok(value)
            }
            Ok(Err(e)) => {
                permit.settle(Outcome::Failure);
                Err(BreakerError::Failed(e))
            }
            Err(_) => {
                tracing::debug!(
                    breaker = %self.name,
                    attempt = permit.attempt,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Call timed out"
                );
                permit.settle(Outcome::Failure);
                Err(BreakerError::Timeout(self.config.timeout))
            }
        }
    }

    /// Like [`execute`](Self::execute), but substitutes `fallback` for any
    /// classified failure when the breaker is configured with
    /// `fallback_on_failure`. The failure is still accounted for first.
    pub async fn execute_with_fallback<F, Fut, T, E, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(&BreakerError<E>) -> T,
        E: std::fmt::Display,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(e) if self.config.fallback_on_failure => {
                tracing::debug!(breaker = %self.name, error = %e, "Serving fallback");
                Ok(fallback(&e))
            }
            Err(e) => Err(e),
        }
    }

    /// Admission check. Commits Open → Half-Open when the cool-down elapsed.
    fn admit(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();

        if state.phase == CircuitState::Open {
            let cooled_down = state
                .opened_at
                .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
            if cooled_down {
                self.transition(&mut state, CircuitState::HalfOpen);
            }
        }

        let attempt = state.next_attempt;
        state.next_attempt += 1;

        match state.phase {
            CircuitState::Closed => Some(Permit::new(self, attempt, state.generation)),
            CircuitState::Open => {
                tracing::debug!(breaker = %self.name, attempt, "Rejected: circuit open");
                None
            }
            CircuitState::HalfOpen => {
                if state.trial.is_some() {
                    tracing::debug!(breaker = %self.name, attempt, "Rejected: trial in flight");
                    return None;
                }
                state.trial = Some(attempt);
                tracing::debug!(breaker = %self.name, attempt, "Admitted half-open trial");
                Some(Permit::new(self, attempt, state.generation))
            }
        }
    }

    fn settle(&self, attempt: u64, generation: u64, outcome: Outcome) {
        let mut state = self.state.lock();

        if state.generation != generation {
            tracing::debug!(
                breaker = %self.name,
                attempt,
                outcome = ?outcome,
                "Discarding outcome from a previous circuit phase"
            );
            return;
        }

        match state.phase {
            CircuitState::Closed => match outcome {
                Outcome::Success => state.failures = 0,
                Outcome::Failure => {
                    state.failures += 1;
                    if state.failures >= self.config.max_failures {
                        self.transition(&mut state, CircuitState::Open);
                    }
                }
                Outcome::Abandoned => {}
            },
            CircuitState::HalfOpen if state.trial == Some(attempt) => match outcome {
                Outcome::Success => self.transition(&mut state, CircuitState::Closed),
                Outcome::Failure | Outcome::Abandoned => {
                    self.transition(&mut state, CircuitState::Open)
                }
            },
            _ => {}
        }
    }

    /// Commit a phase change. Caller holds the state lock.
    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.phase;
        state.phase = to;
        state.generation += 1;
        state.trial = None;

        match to {
            CircuitState::Open => {
                state.opened_at = Some(Instant::now());
                tracing::warn!(
                    breaker = %self.name,
                    failures = state.failures,
                    from = %from,
                    "Circuit breaker OPENED"
                );
            }
            CircuitState::HalfOpen => {
                tracing::debug!(breaker = %self.name, "Circuit breaker transitioning to HALF-OPEN");
            }
            CircuitState::Closed => {
                state.failures = 0;
                state.opened_at = None;
                tracing::info!(breaker = %self.name, "Circuit breaker CLOSED");
            }
        }

        metrics::record_breaker_transition(&self.name, to);

        // No subscribers is fine.
        let _ = self.events.send(StateChange {
            breaker: self.name.clone(),
            from,
            to,
            failures: state.failures,
        });
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission for one call. Dropping it unsettled marks the call abandoned.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    attempt: u64,
    generation: u64,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, attempt: u64, generation: u64) -> Self {
        Self {
            breaker,
            attempt,
            generation,
            settled: false,
        }
    }

    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.attempt, self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker
                .settle(self.attempt, self.generation, Outcome::Abandoned);
        }
    }
}
