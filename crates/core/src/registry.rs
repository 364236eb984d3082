//! Pending-request registry.
//!
//! Maps a logical key to every caller currently waiting on it. The first
//! caller for a key becomes the driver and issues the sends; later callers
//! join as followers. A resolution drains the whole list at once.
//!
//! Invariant: a key is present iff at least one waiter is registered for it.
//! All mutations of a key's waiter list go through the same lock, so a
//! timeout-driven abandon and an arriving resolution can never both observe
//! the same waiter.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::outcome::{LookupOutcome, Unavailable};

/// Whether a joiner must drive the request or just wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Driver,
	Follower,
}

/// What a resolve call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
	/// The outcome reached this many waiters and the entry was removed.
	Delivered(usize),
	/// Nobody was waiting on the key.
	NoWaiters,
	/// The answer carried a nonce not issued for the live entry.
	Stale,
}

struct Entry {
	waiters: Vec<(u64, oneshot::Sender<LookupOutcome>)>,
	driver: u64,
	nonces: HashSet<u64>,
}

#[derive(Default)]
pub struct Registry {
	entries: Mutex<HashMap<u64, Entry>>,
	next_waiter: AtomicU64,
}

impl Registry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Registers interest in `key`.
	pub fn join(self: &Arc<Self>, key: u64) -> (Waiter, Role) {
		let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();

		let role = {
			let mut entries = self.entries.lock();
			match entries.get_mut(&key) {
				Some(entry) => {
					entry.waiters.push((id, tx));
					Role::Follower
				}
				None => {
					entries.insert(
						key,
						Entry {
							waiters: vec![(id, tx)],
							driver: id,
							nonces: HashSet::new(),
						},
					);
					Role::Driver
				}
			}
		};

		trace!(target = "inspect.registry", key, waiter = id, ?role, "joined");
		let waiter = Waiter {
			registry: Arc::clone(self),
			key,
			id,
			role,
			rx,
			settled: false,
		};
		(waiter, role)
	}

	/// Records that an attempt with `nonce` is about to be sent for `key`.
	///
	/// Returns `false` when the key is no longer pending (already resolved).
	pub fn record_attempt(&self, key: u64, nonce: u64) -> bool {
		match self.entries.lock().get_mut(&key) {
			Some(entry) => {
				entry.nonces.insert(nonce);
				true
			}
			None => false,
		}
	}

	/// Delivers a coordinator answer to every waiter on `key`.
	///
	/// A `nonce` that was never issued for the live entry marks the answer as
	/// belonging to an unrelated request; it is dropped and the waiters stay.
	/// Answers without a nonce are matched on the key alone.
	pub fn resolve(&self, key: u64, nonce: Option<u64>, outcome: LookupOutcome) -> Resolution {
		let entry = {
			let mut entries = self.entries.lock();
			let Some(entry) = entries.get(&key) else {
				return Resolution::NoWaiters;
			};
			if let Some(nonce) = nonce {
				if !entry.nonces.contains(&nonce) {
					return Resolution::Stale;
				}
			}
			entries.remove(&key)
		};

		match entry {
			Some(entry) => Resolution::Delivered(deliver(key, entry, outcome)),
			None => Resolution::NoWaiters,
		}
	}

	/// Settles every waiter on `key` with a terminal outcome, bypassing the nonce check.
	pub fn settle(&self, key: u64, outcome: LookupOutcome) -> Resolution {
		match self.entries.lock().remove(&key) {
			Some(entry) => Resolution::Delivered(deliver(key, entry, outcome)),
			None => Resolution::NoWaiters,
		}
	}

	/// Removes exactly one waiter; the entry goes away once it is empty.
	///
	/// Returns `false` if the waiter was not registered (already resolved).
	pub fn abandon(&self, key: u64, waiter: u64) -> bool {
		let mut entries = self.entries.lock();
		let Some(entry) = entries.get_mut(&key) else {
			return false;
		};
		let Some(pos) = entry.waiters.iter().position(|(id, _)| *id == waiter) else {
			return false;
		};
		entry.waiters.remove(pos);
		if entry.waiters.is_empty() {
			entries.remove(&key);
		}
		debug!(target = "inspect.registry", key, waiter, "waiter abandoned");
		true
	}

	/// Abandon for the driving waiter: followers left behind have nobody to
	/// send for them, so they are settled as cancelled instead of hanging.
	fn abandon_drive(&self, key: u64, waiter: u64) {
		let orphaned = {
			let mut entries = self.entries.lock();
			let Some(entry) = entries.get_mut(&key) else {
				return;
			};
			if entry.driver != waiter {
				drop(entries);
				self.abandon(key, waiter);
				return;
			}
			entry.waiters.retain(|(id, _)| *id != waiter);
			entries.remove(&key)
		};

		if let Some(entry) = orphaned {
			if !entry.waiters.is_empty() {
				debug!(target = "inspect.registry", key, followers = entry.waiters.len(), "driver cancelled; releasing followers");
				deliver(key, entry, LookupOutcome::Unavailable(Unavailable::Cancelled));
			}
		}
	}

	pub fn is_pending(&self, key: u64) -> bool {
		self.entries.lock().contains_key(&key)
	}

	/// Number of callers waiting on `key` (0 when not pending).
	pub fn waiter_count(&self, key: u64) -> usize {
		self.entries.lock().get(&key).map_or(0, |entry| entry.waiters.len())
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	pub fn pending_keys(&self) -> Vec<u64> {
		let mut keys: Vec<u64> = self.entries.lock().keys().copied().collect();
		keys.sort_unstable();
		keys
	}
}

fn deliver(key: u64, entry: Entry, outcome: LookupOutcome) -> usize {
	let count = entry.waiters.len();
	for (_, tx) in entry.waiters {
		// A closed receiver belongs to a waiter that is being dropped right now.
		let _ = tx.send(outcome.clone());
	}
	debug!(target = "inspect.registry", key, waiters = count, "resolved pending request");
	count
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry").field("pending", &self.pending_keys()).finish()
	}
}

/// One caller's registration on a key.
///
/// Dropping an unsettled waiter abandons it, so a caller that gives up never
/// leaks an entry.
pub struct Waiter {
	registry: Arc<Registry>,
	key: u64,
	id: u64,
	role: Role,
	rx: oneshot::Receiver<LookupOutcome>,
	settled: bool,
}

impl Waiter {
	pub fn key(&self) -> u64 {
		self.key
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn role(&self) -> Role {
		self.role
	}

	pub fn is_settled(&self) -> bool {
		self.settled
	}

	/// Waits for the outcome. Cancel-safe: dropping the future keeps the registration.
	pub async fn wait(&mut self) -> LookupOutcome {
		if self.settled {
			return LookupOutcome::Unavailable(Unavailable::Cancelled);
		}
		let outcome = (&mut self.rx).await.unwrap_or(LookupOutcome::Unavailable(Unavailable::Cancelled));
		self.settled = true;
		outcome
	}
}

impl Drop for Waiter {
	fn drop(&mut self) {
		if self.settled {
			return;
		}
		match self.role {
			Role::Driver => self.registry.abandon_drive(self.key, self.id),
			Role::Follower => {
				self.registry.abandon(self.key, self.id);
			}
		}
	}
}

impl std::fmt::Debug for Waiter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Waiter")
			.field("key", &self.key)
			.field("id", &self.id)
			.field("role", &self.role)
			.field("settled", &self.settled)
			.finish()
	}
}
