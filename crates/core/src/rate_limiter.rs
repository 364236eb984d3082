//! Per-session send pacing.
//!
//! A [`RateLimiter`] is a binary gate combined with a timestamp: one sender at
//! a time may hold the gate, and it is only handed out once `min_interval`
//! has elapsed since the previous send. Bursts are never allowed.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

pub struct RateLimiter {
	min_interval: Duration,
	gate: AsyncMutex<()>,
	last_send: Mutex<Option<Instant>>,
}

/// Exclusive right to send on a session. Dropping it releases the gate.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct RateGuard<'a> {
	_gate: MutexGuard<'a, ()>,
}

impl RateGuard<'_> {
	/// Releases the gate for the next waiter.
	pub fn release(self) {}
}

impl RateLimiter {
	pub fn new(min_interval: Duration) -> Self {
		Self {
			min_interval,
			gate: AsyncMutex::new(()),
			last_send: Mutex::new(None),
		}
	}

	pub fn min_interval(&self) -> Duration {
		self.min_interval
	}

	/// Time of the most recent send, if any.
	pub fn last_send(&self) -> Option<Instant> {
		*self.last_send.lock()
	}

	/// Waits for the gate and the spacing, then stamps the send time.
	///
	/// Waiters are served in FIFO order (tokio's mutex is fair).
	pub async fn acquire(&self) -> RateGuard<'_> {
		let gate = self.gate.lock().await;

		let previous = *self.last_send.lock();
		if let Some(previous) = previous {
			let ready_at = previous + self.min_interval;
			let now = Instant::now();
			if ready_at > now {
				debug!(
					target = "inspect.ratelimit",
					wait_ms = (ready_at - now).as_millis() as u64,
					"rate limiting"
				);
				tokio::time::sleep_until(ready_at).await;
			}
		}

		*self.last_send.lock() = Some(Instant::now());
		RateGuard { _gate: gate }
	}
}

impl std::fmt::Debug for RateLimiter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RateLimiter")
			.field("min_interval", &self.min_interval)
			.field("last_send", &self.last_send())
			.finish()
	}
}
