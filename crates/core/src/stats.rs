use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Broker-wide counters. Cheap to bump from any task.
#[derive(Debug, Default)]
pub struct Stats {
	lookups: AtomicU64,
	joined: AtomicU64,
	sends: AtomicU64,
	send_failures: AtomicU64,
	timeouts: AtomicU64,
	exhausted: AtomicU64,
	late_answers: AtomicU64,
	stale_answers: AtomicU64,
	drivers_in_flight: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
	/// Lookups that drove their key.
	pub lookups: u64,
	/// Lookups that joined an in-flight key.
	pub joined: u64,
	pub sends: u64,
	pub send_failures: u64,
	pub timeouts: u64,
	pub exhausted: u64,
	/// Answers that arrived after every waiter had gone.
	pub late_answers: u64,
	pub stale_answers: u64,
	/// Lookups currently driving a key. Never exceeds the number of distinct pending keys.
	pub drivers_in_flight: u64,
}

/// Marks one lookup as driving until dropped.
pub(crate) struct DriveGuard<'a> {
	gauge: &'a AtomicU64,
}

impl Drop for DriveGuard<'_> {
	fn drop(&mut self) {
		self.gauge.fetch_sub(1, Ordering::Relaxed);
	}
}

impl Stats {
	pub(crate) fn record_lookup(&self) {
		self.lookups.fetch_add(1, Ordering::Relaxed);
	}

	/// Counts the lookup and holds the in-flight gauge until the guard drops,
	/// including when the driving future is cancelled.
	pub(crate) fn enter_drive(&self) -> DriveGuard<'_> {
		self.record_lookup();
		self.drivers_in_flight.fetch_add(1, Ordering::Relaxed);
		DriveGuard {
			gauge: &self.drivers_in_flight,
		}
	}

	pub(crate) fn record_join(&self) {
		self.joined.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_send(&self) {
		self.sends.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_send_failure(&self) {
		self.send_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_timeout(&self) {
		self.timeouts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exhausted(&self) {
		self.exhausted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_late_answer(&self) {
		self.late_answers.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_stale_answer(&self) {
		self.stale_answers.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			lookups: self.lookups.load(Ordering::Relaxed),
			joined: self.joined.load(Ordering::Relaxed),
			sends: self.sends.load(Ordering::Relaxed),
			send_failures: self.send_failures.load(Ordering::Relaxed),
			timeouts: self.timeouts.load(Ordering::Relaxed),
			exhausted: self.exhausted.load(Ordering::Relaxed),
			late_answers: self.late_answers.load(Ordering::Relaxed),
			stale_answers: self.stale_answers.load(Ordering::Relaxed),
			drivers_in_flight: self.drivers_in_flight.load(Ordering::Relaxed),
		}
	}
}
