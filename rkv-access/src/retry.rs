//! # Connect-Time Retry
//!
//! Purpose: Bounded exponential backoff for establishing endpoint connections.
//!
//! ## Design Principles
//! 1. **Bounded Work**: Exactly `max_attempts` attempts, each delay capped.
//! 2. **Transient Only**: Authentication, config and protocol failures end the
//!    loop at once; only `RkvError::Connection` is retried.
//! 3. **Cooperative Cancellation**: A shared flag is checked before every
//!    attempt and every sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::warn;

use rkv_common::{RetryPolicy, RkvError, RkvResult};

/// Delays between attempts: `min(base * 2^i, cap)` for `i = 0..max_attempts-1`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    step: u32,
    remaining: u32,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Backoff {
            base: policy.base_delay(),
            cap: policy.max_delay(),
            step: 0,
            remaining: policy.max_attempts.saturating_sub(1),
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let factor = 1u32.checked_shl(self.step).unwrap_or(u32::MAX);
        self.step = self.step.saturating_add(1);
        Some(self.base.saturating_mul(factor).min(self.cap))
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are spent. Returns the value and the attempt number.
pub fn with_backoff<T, F>(
    label: &str,
    policy: &RetryPolicy,
    cancel: Option<&AtomicBool>,
    mut op: F,
) -> RkvResult<(T, u32)>
where
    F: FnMut() -> RkvResult<T>,
{
    let cancelled = || cancel.map_or(false, |flag| flag.load(Ordering::Acquire));
    let mut delays = Backoff::new(policy);
    let mut attempt = 1u32;

    loop {
        if cancelled() {
            return Err(RkvError::connection(label, "connection attempt cancelled"));
        }
        let err = match op() {
            Ok(value) => return Ok((value, attempt)),
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };
        let delay = match delays.next() {
            Some(delay) => delay,
            None => return Err(err),
        };
        warn!(
            endpoint = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "connection attempt failed, retrying"
        );
        if cancelled() {
            return Err(RkvError::connection(label, "connection attempt cancelled"));
        }
        thread::sleep(delay);
        attempt += 1;
    }
}
