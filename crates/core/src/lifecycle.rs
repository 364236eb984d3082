//! Background tasks owned by a running broker.
//!
//! Each session gets one loop that pumps its transport events and walks the
//! session state machine. Answers are not resolved in those loops: they are
//! forwarded to a single resolver task, which is the only caller of
//! [`Registry::resolve`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use inspect_protocol::ItemDescriptor;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::registry::{Registry, Resolution};
use crate::session::{Session, SessionId, SessionState};
use crate::stats::Stats;
use crate::transport::{Transport, TransportEvent};

/// A coordinator answer on its way to the resolver.
#[derive(Debug)]
pub(crate) struct Answer {
	pub session: SessionId,
	pub key: u64,
	pub nonce: Option<u64>,
	pub item: Option<ItemDescriptor>,
}

#[derive(Clone)]
pub(crate) struct SessionLoop {
	session: Arc<Session>,
	transport: Arc<dyn Transport>,
	answers: mpsc::UnboundedSender<Answer>,
	config: Arc<BrokerConfig>,
	running: Arc<AtomicBool>,
}

impl SessionLoop {
	pub(crate) fn new(
		session: Arc<Session>,
		transport: Arc<dyn Transport>,
		answers: mpsc::UnboundedSender<Answer>,
		config: Arc<BrokerConfig>,
		running: Arc<AtomicBool>,
	) -> Self {
		Self {
			session,
			transport,
			answers,
			config,
			running,
		}
	}

	/// Connects the session and pumps its events until `halt` flips.
	pub(crate) fn spawn(self, events: mpsc::UnboundedReceiver<TransportEvent>, halt: watch::Receiver<bool>) -> JoinHandle<()> {
		tokio::spawn(async move {
			if !self.try_connect().await {
				self.schedule_reconnect();
			}
			self.pump(events, halt).await;
		})
	}

	fn running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	async fn pump(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>, mut halt: watch::Receiver<bool>) {
		loop {
			tokio::select! {
				biased;
				event = events.recv() => match event {
					Some(event) => self.handle(event).await,
					None => break,
				},
				_ = halted(&mut halt) => {
					// Apply whatever the shutdown disconnect already queued.
					while let Ok(event) = events.try_recv() {
						self.handle(event).await;
					}
					break;
				}
			}
		}
		debug!(target = "inspect.session", session = %self.session.label(), "session loop stopped");
	}

	/// Starts a connection attempt. Returns `false` if it failed outright.
	async fn try_connect(&self) -> bool {
		if self.session.transition(SessionState::Connecting).is_err() {
			return true;
		}
		info!(target = "inspect.session", session = %self.session.label(), "connecting");
		match self.transport.connect(self.session.id()).await {
			Ok(()) => true,
			Err(err) => {
				warn!(target = "inspect.session", session = %self.session.label(), error = %err, "connect failed");
				let _ = self.session.transition(SessionState::Disconnected);
				false
			}
		}
	}

	fn schedule_reconnect(&self) {
		let this = self.clone();
		tokio::spawn(async move {
			loop {
				tokio::time::sleep(this.config.reconnect_delay()).await;
				if !this.running() || this.session.state() != SessionState::Disconnected {
					return;
				}
				info!(target = "inspect.session", session = %this.session.label(), "reconnecting");
				if this.try_connect().await {
					return;
				}
			}
		});
	}

	fn schedule_handshake(&self) {
		let this = self.clone();
		tokio::spawn(async move {
			tokio::time::sleep(this.config.handshake_delay()).await;
			if this.session.state() != SessionState::LoggedIn {
				return;
			}
			debug!(target = "inspect.session", session = %this.session.label(), "sending coordinator hello");
			if let Err(err) = this.transport.handshake(this.session.id(), this.config.handshake_version).await {
				warn!(target = "inspect.session", session = %this.session.label(), error = %err, "handshake failed");
			}
		});
	}

	async fn handle(&self, event: TransportEvent) {
		let label = self.session.label();
		match event {
			TransportEvent::Connected => {
				if self.session.transition(SessionState::Connected).is_err() {
					return;
				}
				debug!(target = "inspect.session", session = %label, "connected; logging in");
				let credentials = self.session.credentials();
				if let Err(err) = self.transport.authenticate(self.session.id(), credentials).await {
					warn!(target = "inspect.session", session = %label, error = %err, "failed to send login");
				}
			}
			TransportEvent::LoggedOn(Ok(())) => {
				if self.session.transition(SessionState::LoggedIn).is_ok() {
					info!(target = "inspect.session", session = %label, "logged in");
					self.schedule_handshake();
				}
			}
			TransportEvent::LoggedOn(Err(reason)) => {
				warn!(target = "inspect.session", session = %label, %reason, "login rejected");
				let _ = self.session.transition(SessionState::Faulted);
			}
			TransportEvent::LoggedOff { reason } => {
				warn!(target = "inspect.session", session = %label, reason = reason.as_deref().unwrap_or("unknown"), "logged off");
				let _ = self.session.transition(SessionState::Connected);
			}
			TransportEvent::Welcome { version } => match self.session.state() {
				SessionState::LoggedIn => {
					let _ = self.session.transition(SessionState::Ready);
					info!(target = "inspect.session", session = %label, version, "coordinator ready");
				}
				state => debug!(target = "inspect.session", session = %label, %state, "ignoring welcome"),
			},
			TransportEvent::ConnectionStatus { status, have_session } => {
				if have_session {
					debug!(target = "inspect.session", session = %label, %status, "coordinator status");
				} else {
					warn!(target = "inspect.session", session = %label, %status, "coordinator reports no session");
				}
			}
			TransportEvent::LogonFatalError { code, message } => {
				error!(target = "inspect.session", session = %label, code, %message, "fatal logon error");
				let _ = self.session.transition(SessionState::Faulted);
			}
			TransportEvent::Disconnected { user_initiated } => {
				let previous = self.session.state();
				if previous == SessionState::Disconnected {
					return;
				}
				let _ = self.session.transition(SessionState::Disconnected);
				if user_initiated || !self.running() {
					info!(target = "inspect.session", session = %label, "disconnected");
				} else if previous == SessionState::Faulted {
					warn!(target = "inspect.session", session = %label, "disconnected after fault; not reconnecting");
				} else {
					warn!(
						target = "inspect.session",
						session = %label,
						delay_ms = self.config.reconnect_delay_ms,
						"connection lost; scheduling reconnect"
					);
					self.schedule_reconnect();
				}
			}
			TransportEvent::Response { key, nonce, item } => {
				let answer = Answer {
					session: self.session.id(),
					key,
					nonce,
					item,
				};
				if self.answers.send(answer).is_err() {
					debug!(target = "inspect.session", session = %label, key, "resolver gone; dropping answer");
				}
			}
		}
	}
}

async fn halted(halt: &mut watch::Receiver<bool>) {
	let _ = halt.wait_for(|halted| *halted).await;
}

/// Owns the resolve path: every answer from every session passes through here.
pub(crate) async fn run_resolver(mut answers: mpsc::UnboundedReceiver<Answer>, registry: Arc<Registry>, stats: Arc<Stats>) {
	while let Some(answer) = answers.recv().await {
		let Answer { session, key, nonce, item } = answer;
		match registry.resolve(key, nonce, item.into()) {
			Resolution::Delivered(waiters) => {
				debug!(target = "inspect.broker", %session, key, waiters, "answer delivered");
			}
			Resolution::NoWaiters => {
				stats.record_late_answer();
				debug!(target = "inspect.broker", %session, key, "answer with no waiters; dropped");
			}
			Resolution::Stale => {
				stats.record_stale_answer();
				debug!(target = "inspect.broker", %session, key, ?nonce, "stale answer; dropped");
			}
		}
	}
}
