use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// All calls go through the protected operation.
    Closed,
    /// All calls go straight to the fallback.
    Open,
    /// One probe call goes through to test whether the operation recovered.
    HalfOpen,
}

impl CircuitState {
    fn from_u8(state: u8) -> Self {
        match state {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A process-local circuit breaker.
///
/// Once more than `max_failures` calls in a row failed, the breaker opens and answers every
/// call with the fallback, without touching the protected operation. After `open_duration`, one
/// caller is let through as a probe while everybody else keeps getting the fallback. A successful
/// probe closes the breaker, a failed one opens it again.
///
/// The counters are plain atomics. Concurrent failures may be over-counted slightly, which only
/// makes the breaker open a little early.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    max_failures: u32,
    open_duration: Option<Duration>,
    state: AtomicU8,
    failures: AtomicU32,
    /// When the breaker last opened, in milliseconds since `epoch`.
    opened_at: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            max_failures: config.max_failures,
            open_duration: config.open_duration,
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
            failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The number of failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Runs `operation`, or `fallback` if the breaker is open or `operation` fails.
    ///
    /// Errors of the fallback are returned as they are.
    pub async fn execute<T, E, FE, Op, OpFut, Fb, FbFut>(
        &self,
        operation: Op,
        fallback: Fb,
    ) -> Result<T, FE>
    where
        E: std::error::Error + 'static,
        Op: FnOnce() -> OpFut,
        OpFut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, FE>>,
    {
        if !self.admit() {
            metric!(
                counter("circuit_breaker.fallback") += 1,
                "breaker" => self.name,
                "reason" => "open",
            );
            return fallback().await;
        }

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    breaker = self.name,
                    "Protected operation failed, using fallback",
                );
                self.on_failure();
                metric!(
                    counter("circuit_breaker.fallback") += 1,
                    "breaker" => self.name,
                    "reason" => "failure",
                );
                fallback().await
            }
        }
    }

    /// Whether a call may go through to the protected operation.
    fn admit(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open | CircuitState::HalfOpen => self.try_probe(),
        }
    }

    /// Lets one caller through once the cool-down since the last transition elapsed.
    ///
    /// Concurrent callers race on the transition timestamp, so each cool-down admits a single
    /// probe. A probe that never reports back is replaced after another cool-down.
    fn try_probe(&self) -> bool {
        let Some(open_duration) = self.open_duration else {
            return false;
        };
        let since = self.opened_at.load(Ordering::Acquire);
        let now = self.epoch.elapsed().as_millis() as u64;
        if Duration::from_millis(now.saturating_sub(since)) < open_duration {
            return false;
        }

        let probing = self
            .opened_at
            .compare_exchange(since, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if probing {
            self.state
                .store(CircuitState::HalfOpen.as_u8(), Ordering::Release);
            tracing::info!(breaker = self.name, "Circuit breaker half-open, probing");
            self.report_state(CircuitState::HalfOpen);
        }
        probing
    }

    fn on_success(&self) {
        self.failures.store(0, Ordering::Release);
        let previous = self.state.swap(CircuitState::Closed.as_u8(), Ordering::AcqRel);
        if previous != CircuitState::Closed.as_u8() {
            tracing::info!(breaker = self.name, "Circuit breaker closed");
            self.report_state(CircuitState::Closed);
        }
    }

    fn on_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let probe_failed = self.state() == CircuitState::HalfOpen;
        if failures <= self.max_failures && !probe_failed {
            return;
        }

        let opened_at = self.epoch.elapsed().as_millis() as u64;
        self.opened_at.store(opened_at, Ordering::Release);
        let previous = self.state.swap(CircuitState::Open.as_u8(), Ordering::AcqRel);
        if previous != CircuitState::Open.as_u8() {
            tracing::error!(breaker = self.name, failures, "Circuit breaker opened");
            self.report_state(CircuitState::Open);
        }
    }

    fn report_state(&self, state: CircuitState) {
        metric!(
            gauge("circuit_breaker.state") = state.as_u8() as u64,
            "breaker" => self.name,
        );
    }
}
