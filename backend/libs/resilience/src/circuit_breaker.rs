/// Circuit Breaker with consecutive-failure and sliding-window error-rate trips
///
/// State transitions:
/// - Closed → Open: consecutive failures reach `failure_threshold`, or the
///   window error rate reaches `error_rate_threshold` once `minimum_calls`
///   outcomes have been recorded
/// - Open → HalfOpen: after `reset_timeout`
/// - HalfOpen → Closed: `success_threshold` consecutive successes
/// - HalfOpen → Open: on any failure
///
/// The breaker never retries. A rejected call returns `CircuitBreakerError::Open`
/// without invoking the wrapped operation; the inner error is passed through
/// untouched otherwise so callers keep their own error taxonomy.
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Requests fail fast
    Open,
    /// Probing whether the dependency recovered
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Consecutive HalfOpen successes that close it again
    pub success_threshold: u32,
    /// Time spent Open before a probe is allowed
    pub reset_timeout: Duration,
    /// Error rate (0.0 - 1.0) that opens the circuit
    pub error_rate_threshold: f64,
    /// Sliding window size for error rate calculation
    pub window_size: usize,
    /// Outcomes required in the window before the error rate is considered
    pub minimum_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            error_rate_threshold: 0.5,
            window_size: 100,
            minimum_calls: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open - failing fast")]
    Open,
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open)
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open => None,
            CircuitBreakerError::Inner(e) => Some(e),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<RwLock<BreakerState>>,
}

struct BreakerState {
    current: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// true = success, false = failure
    window: VecDeque<bool>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(BreakerState {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                window: VecDeque::with_capacity(config.window_size),
            })),
            config,
        }
    }

    /// Execute a future with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(CircuitBreakerError::Open);
        }

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);

                if elapsed {
                    info!(breaker = %self.name, "Circuit breaker: Open → HalfOpen");
                    state.current = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    state.consecutive_failures = 0;
                }
                elapsed
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.state.write();

        state.consecutive_successes += 1;
        state.consecutive_failures = 0;
        self.push_outcome(&mut state, true);

        if state.current == CircuitState::HalfOpen
            && state.consecutive_successes >= self.config.success_threshold
        {
            info!(breaker = %self.name, "Circuit breaker: HalfOpen → Closed");
            state.current = CircuitState::Closed;
            state.opened_at = None;
            state.window.clear();
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.write();

        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
        self.push_outcome(&mut state, false);

        match state.current {
            CircuitState::Closed => {
                let error_rate = Self::error_rate_of(&state);
                let rate_tripped = state.window.len() >= self.config.minimum_calls
                    && error_rate >= self.config.error_rate_threshold;

                if state.consecutive_failures >= self.config.failure_threshold || rate_tripped {
                    warn!(
                        breaker = %self.name,
                        failures = state.consecutive_failures,
                        error_rate,
                        "Circuit breaker: Closed → Open"
                    );
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker: HalfOpen → Open (probe failed)");
                state.current = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    fn push_outcome(&self, state: &mut BreakerState, success: bool) {
        if state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(success);
    }

    fn error_rate_of(state: &BreakerState) -> f64 {
        if state.window.is_empty() {
            return 0.0;
        }

        let failures = state.window.iter().filter(|&&ok| !ok).count();
        failures as f64 / state.window.len() as f64
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    /// Current window error rate (for monitoring)
    pub fn error_rate(&self) -> f64 {
        Self::error_rate_of(&self.state.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("test", config)
    }

    #[tokio::test]
    async fn test_opens_on_consecutive_failures() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            ..Default::default()
        });
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;

        let mut invoked = false;
        let result = cb
            .call(|| {
                invoked = true;
                async { Ok::<_, String>(()) }
            })
            .await;

        assert!(result.unwrap_err().is_open());
        assert!(!invoked);
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let cb = breaker(CircuitBreakerConfig::default());
        let result = cb.call(|| async { Err::<(), _>(42u8) }).await;
        assert_eq!(result.unwrap_err().into_inner(), Some(42));
    }

    #[tokio::test]
    async fn test_halfopen_after_reset_timeout() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let _ = cb.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_halfopen_failure_reopens() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = cb.call(|| async { Ok::<_, String>(()) }).await;

        let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_error_rate_needs_minimum_calls() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 100,
            error_rate_threshold: 0.5,
            window_size: 10,
            minimum_calls: 10,
            ..Default::default()
        });

        // A single early failure is a 100% error rate but below the volume floor
        let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        assert_eq!(cb.state(), CircuitState::Closed);

        for _ in 0..4 {
            let _ = cb.call(|| async { Ok::<_, String>(()) }).await;
        }
        for _ in 0..5 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }

        // 6 of 10 failed
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
