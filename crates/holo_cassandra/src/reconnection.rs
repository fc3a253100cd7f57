//! Reconnection policies that drive the executor's backoff schedule.
//!
//! A policy is shared and stateless; every executor call asks it for a fresh
//! [`ReconnectionSchedule`] whose state advances only within that call.

use std::time::Duration;

/// Factory for per-call backoff schedules.
pub trait ReconnectionPolicy: Send + Sync {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule>;
}

/// Stateful sequence of delays consumed by one retry loop.
pub trait ReconnectionSchedule: Send {
    fn next_delay(&mut self) -> Duration;
}

/// Doubles the delay on every step, starting at `base` and capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialReconnectionPolicy {
    base: Duration,
    max: Duration,
}

impl ExponentialReconnectionPolicy {
    /// Builds a policy; `base` is clamped to at least 1ms and `max` to at
    /// least `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(600))
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ExponentialSchedule {
            base_ms: duration_millis(self.base),
            max_ms: duration_millis(self.max),
            attempts: 0,
        })
    }
}

struct ExponentialSchedule {
    base_ms: u64,
    max_ms: u64,
    attempts: u32,
}

impl ReconnectionSchedule for ExponentialSchedule {
    fn next_delay(&mut self) -> Duration {
        // 2^63 already saturates any realistic cap.
        let shift = self.attempts.min(63);
        self.attempts = self.attempts.saturating_add(1);
        let raw_ms = self.base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(raw_ms.min(self.max_ms))
    }
}

/// Always waits the same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantReconnectionPolicy {
    delay: Duration,
}

impl ConstantReconnectionPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ConstantSchedule { delay: self.delay })
    }
}

struct ConstantSchedule {
    delay: Duration,
}

impl ReconnectionSchedule for ConstantSchedule {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }
}

fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
