//! Request routing over the session pool.
//!
//! A lookup joins the registry under its key. The first caller drives: it
//! picks sessions round-robin, paces each send through the session's rate
//! limiter and races the shared waiter against a per-attempt timeout. Later
//! callers for the same key only wait. Expected failures come back as
//! [`LookupOutcome::Unavailable`] values, never as errors.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use inspect_protocol::{Credentials, LookupParams};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{self, SessionLoop};
use crate::outcome::{LookupOutcome, Unavailable};
use crate::pool::SessionPool;
use crate::registry::{Registry, Role, Waiter};
use crate::stats::Stats;
use crate::transport::{Transport, WireRequest};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to a running broker. Clones share the same sessions and registry.
#[derive(Clone)]
pub struct Broker {
	inner: Arc<Inner>,
}

struct Inner {
	config: Arc<BrokerConfig>,
	pool: SessionPool,
	registry: Arc<Registry>,
	transport: Arc<dyn Transport>,
	stats: Arc<Stats>,
	running: Arc<AtomicBool>,
	halt: watch::Sender<bool>,
	next_nonce: AtomicU64,
	loops: Mutex<Vec<JoinHandle<()>>>,
	resolver: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
	/// Builds one session per account, connects them all and spawns the
	/// background loops. Returns as soon as the connects are issued; use
	/// [`Broker::wait_ready`] to block until a session can carry requests.
	pub async fn start(config: BrokerConfig, accounts: Vec<Credentials>, transport: Arc<dyn Transport>) -> Result<Self> {
		config.validate()?;
		let pool = SessionPool::from_credentials(accounts, config.min_request_interval())?;
		let config = Arc::new(config);
		let registry = Registry::new();
		let stats = Arc::new(Stats::default());
		let running = Arc::new(AtomicBool::new(true));
		let (halt, _) = watch::channel(false);

		let (answers_tx, answers_rx) = mpsc::unbounded_channel();
		let resolver = tokio::spawn(lifecycle::run_resolver(answers_rx, Arc::clone(&registry), Arc::clone(&stats)));

		let loops = pool
			.iter()
			.map(|session| {
				let events = transport.subscribe(session.id());
				SessionLoop::new(
					Arc::clone(session),
					Arc::clone(&transport),
					answers_tx.clone(),
					Arc::clone(&config),
					Arc::clone(&running),
				)
				.spawn(events, halt.subscribe())
			})
			.collect();

		info!(target = "inspect.broker", sessions = pool.len(), "broker started");

		Ok(Self {
			inner: Arc::new(Inner {
				config,
				pool,
				registry,
				transport,
				stats,
				running,
				halt,
				next_nonce: AtomicU64::new(1),
				loops: Mutex::new(loops),
				resolver: Mutex::new(Some(resolver)),
			}),
		})
	}

	/// Resolves `params`, sharing the work with any concurrent lookup of the same key.
	///
	/// Cancel-safe: dropping the returned future abandons only this caller's
	/// wait. A cancelled driver releases its followers with
	/// [`Unavailable::Cancelled`].
	pub async fn lookup(&self, params: LookupParams) -> LookupOutcome {
		let inner = &self.inner;
		if !inner.running.load(Ordering::Acquire) {
			return LookupOutcome::Unavailable(Unavailable::NoSession);
		}

		let key = params.key();
		let (mut waiter, role) = inner.registry.join(key);
		match role {
			Role::Follower => {
				inner.stats.record_join();
				debug!(target = "inspect.broker", key, "joined in-flight lookup");
				waiter.wait().await
			}
			Role::Driver => {
				let _driving = inner.stats.enter_drive();
				self.drive(params, &mut waiter).await
			}
		}
	}

	async fn drive(&self, params: LookupParams, waiter: &mut Waiter) -> LookupOutcome {
		let inner = &self.inner;
		let key = params.key();
		let budget = inner.config.max_attempts.min(inner.pool.len());
		let mut tried = HashSet::with_capacity(budget);
		let mut sent = 0usize;

		for _ in 0..budget {
			let Some(session) = inner.pool.next(&tried) else {
				break;
			};
			tried.insert(session.id());
			if !session.is_ready() {
				debug!(target = "inspect.broker", session = %session.label(), state = %session.state(), key, "skipping unready session");
				continue;
			}

			let guard = session.limiter().acquire().await;
			let nonce = inner.next_nonce.fetch_add(1, Ordering::Relaxed);
			if !inner.registry.record_attempt(key, nonce) {
				// An earlier attempt's answer landed while we waited for the gate.
				guard.release();
				return waiter.wait().await;
			}
			let result = inner.transport.send(session.id(), WireRequest { nonce, params }).await;
			guard.release();

			if let Err(err) = result {
				inner.stats.record_send_failure();
				if err.is_transport() {
					warn!(target = "inspect.broker", session = %session.label(), key, error = %err, "send failed; trying next session");
				} else {
					error!(target = "inspect.broker", session = %session.label(), key, error = %err, "request could not be sent; trying next session");
				}
				continue;
			}
			inner.stats.record_send();
			sent += 1;
			debug!(target = "inspect.broker", session = %session.label(), key, nonce, attempt = sent, "request sent");

			match tokio::time::timeout(inner.config.attempt_timeout(), waiter.wait()).await {
				Ok(outcome) => return outcome,
				Err(_) => {
					inner.stats.record_timeout();
					warn!(target = "inspect.broker", session = %session.label(), key, "attempt timed out");
				}
			}
		}

		let outcome = if sent == 0 {
			warn!(target = "inspect.broker", key, "no ready session for lookup");
			LookupOutcome::Unavailable(Unavailable::NoSession)
		} else {
			inner.stats.record_exhausted();
			warn!(target = "inspect.broker", key, attempts = sent, "lookup exhausted its attempts");
			LookupOutcome::Unavailable(Unavailable::Exhausted { attempts: sent })
		};
		// A late answer may still win the race against this settle; the waiter
		// reports whichever got there first.
		inner.registry.settle(key, outcome);
		waiter.wait().await
	}

	/// Waits until at least one session accepts requests, meaning it is logged in
	/// (`LoggedIn` or `Ready`). The handshake is not required.
	///
	/// Returns the number of such sessions, or [`Error::NotReady`] once
	/// `ready_timeout` passes without any.
	pub async fn wait_ready(&self) -> Result<usize> {
		let limit = self.inner.config.ready_timeout();
		let deadline = Instant::now() + limit;
		loop {
			let ready = self.ready_count();
			if ready > 0 {
				info!(target = "inspect.broker", ready, total = self.inner.pool.len(), "sessions ready");
				return Ok(ready);
			}
			if !self.is_running() {
				return Err(Error::Shutdown);
			}
			let now = Instant::now();
			if now >= deadline {
				warn!(target = "inspect.broker", timeout_ms = limit.as_millis() as u64, "no session became ready");
				return Err(Error::NotReady(limit));
			}
			tokio::time::sleep(READY_POLL_INTERVAL.min(deadline - now)).await;
		}
	}

	/// Stops reconnects, disconnects every session and waits for the loops to exit.
	pub async fn shutdown(&self) {
		let inner = &self.inner;
		if !inner.running.swap(false, Ordering::AcqRel) {
			return;
		}
		info!(target = "inspect.broker", "shutting down");

		for session in inner.pool.iter() {
			if let Err(err) = inner.transport.disconnect(session.id()).await {
				debug!(target = "inspect.broker", session = %session.label(), error = %err, "disconnect failed");
			}
		}
		inner.halt.send_replace(true);

		let loops = std::mem::take(&mut *inner.loops.lock());
		for handle in loops {
			let _ = handle.await;
		}
		if let Some(resolver) = inner.resolver.lock().take() {
			resolver.abort();
		}
	}

	pub fn is_running(&self) -> bool {
		self.inner.running.load(Ordering::Acquire)
	}

	pub fn ready_count(&self) -> usize {
		self.inner.pool.ready_count()
	}

	pub fn pool(&self) -> &SessionPool {
		&self.inner.pool
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.inner.registry
	}

	pub fn stats(&self) -> &Stats {
		&self.inner.stats
	}

	pub fn config(&self) -> &BrokerConfig {
		&self.inner.config
	}
}

impl std::fmt::Debug for Broker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Broker")
			.field("pool", &self.inner.pool)
			.field("registry", &self.inner.registry)
			.field("running", &self.is_running())
			.finish()
	}
}

impl Drop for Inner {
	fn drop(&mut self) {
		for handle in self.loops.get_mut().drain(..) {
			handle.abort();
		}
		if let Some(resolver) = self.resolver.get_mut().take() {
			resolver.abort();
		}
	}
}
