use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all calls pass through.
    Closed,
    /// Tripped, calls are rejected.
    Open,
    /// Cooldown elapsed, one probe call allowed.
    HalfOpen,
}

/// Opens after `failure_threshold` consecutive failures; a successful probe
/// after the cooldown closes it again.
pub struct CircuitBreaker {
    name: String,
    failure_count: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    /// Never held across await points.
    inner: Mutex<CircuitInner>,
}

struct CircuitInner {
    state: CircuitState,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_count: AtomicU32::new(0),
            failure_threshold,
            cooldown,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                last_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether a call should be allowed.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match inner.last_failure {
                Some(last) if last.elapsed() >= self.cooldown => {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(circuit = %self.name, "Circuit breaker half-open");
                    true
                }
                Some(_) => false,
                None => {
                    inner.state = CircuitState::Closed;
                    true
                }
            },
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut inner = self.lock();

        if inner.state != CircuitState::Closed {
            tracing::info!(
                circuit = %self.name,
                previous_state = ?inner.state,
                "Circuit breaker closing after success"
            );
            inner.state = CircuitState::Closed;
            metrics::counter!("circuit_breaker.recoveries", "circuit" => self.name.clone())
                .increment(1);
        }
    }

    pub fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.lock();

        inner.last_failure = Some(Instant::now());

        // A failed half-open probe reopens immediately.
        let reopen = inner.state == CircuitState::HalfOpen;
        if (count >= self.failure_threshold || reopen) && inner.state != CircuitState::Open {
            tracing::warn!(
                circuit = %self.name,
                failures = count,
                threshold = self.failure_threshold,
                "Circuit breaker OPEN"
            );
            inner.state = CircuitState::Open;
            metrics::counter!("circuit_breaker.trips", "circuit" => self.name.clone()).increment(1);
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Circuit breakers for every external dependency of a run.
pub struct CircuitBreakerRegistry {
    pub llm_api: CircuitBreaker,
    pub search: CircuitBreaker,
    pub fetch: CircuitBreaker,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self {
            llm_api: CircuitBreaker::new("llm_api", 3, Duration::from_secs(120)),
            search: CircuitBreaker::new("search", 3, Duration::from_secs(60)),
            fetch: CircuitBreaker::new("fetch", 5, Duration::from_secs(60)),
        }
    }

    /// Emit gauge metrics for all circuit breaker states.
    pub fn report_metrics(&self) {
        for cb in [&self.llm_api, &self.search, &self.fetch] {
            let state_value = match cb.current_state() {
                CircuitState::Closed => 0.0,
                CircuitState::HalfOpen => 0.5,
                CircuitState::Open => 1.0,
            };
            metrics::gauge!("circuit_breaker.state", "circuit" => cb.name().to_string())
                .set(state_value);
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
