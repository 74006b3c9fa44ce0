use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Fails calls to a remote dependency fast once it has failed repeatedly.
///
///   Closed   --[threshold consecutive failures]--> Open
///   Open     --[cooldown elapsed]----------------> HalfOpen
///   HalfOpen --[success]-------------------------> Closed
///   HalfOpen --[failure]-------------------------> Open
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    /// Milliseconds since `epoch` at which the breaker last opened.
    opened_at_ms: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            OPEN => {
                let since = self
                    .elapsed_ms()
                    .saturating_sub(self.opened_at_ms.load(Ordering::Acquire));
                if since < self.cooldown.as_millis() as u64 {
                    return BreakerState::Open;
                }
                // Only one caller wins the probe transition; the rest re-read.
                let _ = self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire);
                match self.state.load(Ordering::Acquire) {
                    CLOSED => BreakerState::Closed,
                    OPEN => BreakerState::Open,
                    _ => BreakerState::HalfOpen,
                }
            }
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    pub fn allow_request(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED {
            tracing::info!("[breaker {}] closed", self.name);
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        match self.state.load(Ordering::Acquire) {
            HALF_OPEN => self.open(failures),
            CLOSED if failures >= self.failure_threshold => self.open(failures),
            _ => {}
        }
    }

    fn open(&self, failures: u32) {
        self.opened_at_ms.store(self.elapsed_ms(), Ordering::Release);
        self.state.store(OPEN, Ordering::Release);
        tracing::warn!(
            "[breaker {}] opened after {} consecutive failures; cooling down for {:?}",
            self.name,
            failures,
            self.cooldown
        );
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn force_half_open(&self) {
        self.state.store(HALF_OPEN, Ordering::Release);
    }
}
