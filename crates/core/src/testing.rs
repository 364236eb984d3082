//! In-memory transport for exercising the broker without a gateway.
//!
//! # Example
//!
//! ```ignore
//! let (transport, controller) = FakeTransportBuilder::new()
//!     .session_responder(1, Responder::Silent)
//!     .build();
//! let broker = Broker::start(BrokerConfig::default(), accounts, transport).await?;
//! broker.wait_ready().await?;
//!
//! let outcome = broker.lookup(LookupParams::new(0, 42, 9, 0)).await;
//! assert_eq!(controller.sent().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use inspect_protocol::{Credentials, ItemDescriptor};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::Error;
use crate::session::SessionId;
use crate::transport::{Transport, TransportEvent, TransportFuture, WireRequest};

/// How the fake coordinator reacts to a request on one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Responder {
	/// Accept the send, never answer.
	Silent,
	/// Answer with [`fake_item`] after `delay`.
	Answer { delay: Duration },
	/// Answer "no data" after `delay`.
	NotFound { delay: Duration },
	/// Fail the send itself.
	FailSend,
}

#[derive(Debug, Clone)]
struct Script {
	responder: Responder,
	login: Result<(), String>,
	refuse_connect: bool,
	welcome: bool,
}

impl Default for Script {
	fn default() -> Self {
		Self {
			responder: Responder::Answer {
				delay: Duration::from_millis(50),
			},
			login: Ok(()),
			refuse_connect: false,
			welcome: true,
		}
	}
}

/// Builder for [`FakeTransport`] instances.
#[derive(Debug, Default)]
pub struct FakeTransportBuilder {
	default: Script,
	scripts: HashMap<SessionId, Script>,
	echo_nonce: bool,
}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {
			echo_nonce: true,
			..Default::default()
		}
	}

	/// Responder for every session without its own.
	pub fn responder(mut self, responder: Responder) -> Self {
		self.default.responder = responder;
		for script in self.scripts.values_mut() {
			script.responder = responder;
		}
		self
	}

	pub fn session_responder(mut self, session: usize, responder: Responder) -> Self {
		self.script(session).responder = responder;
		self
	}

	pub fn reject_login(mut self, session: usize, reason: impl Into<String>) -> Self {
		self.script(session).login = Err(reason.into());
		self
	}

	pub fn reject_all_logins(mut self, reason: impl Into<String>) -> Self {
		let reason = reason.into();
		self.default.login = Err(reason.clone());
		for script in self.scripts.values_mut() {
			script.login = Err(reason.clone());
		}
		self
	}

	pub fn refuse_connect(mut self, session: usize) -> Self {
		self.script(session).refuse_connect = true;
		self
	}

	/// Never answer the coordinator hello.
	pub fn without_welcome(mut self) -> Self {
		self.default.welcome = false;
		for script in self.scripts.values_mut() {
			script.welcome = false;
		}
		self
	}

	/// Answers carry no nonce, like a gateway that does not track attempts.
	pub fn without_nonce_echo(mut self) -> Self {
		self.echo_nonce = false;
		self
	}

	fn script(&mut self, session: usize) -> &mut Script {
		let default = self.default.clone();
		self.scripts.entry(SessionId(session)).or_insert(default)
	}

	pub fn build(self) -> (Arc<FakeTransport>, FakeTransportController) {
		let shared = Arc::new(Shared {
			state: Mutex::new(State {
				default: self.default,
				scripts: self.scripts,
				..Default::default()
			}),
			echo_nonce: self.echo_nonce,
		});
		let transport = Arc::new(FakeTransport {
			shared: Arc::clone(&shared),
		});
		(transport, FakeTransportController { shared })
	}
}

/// A request the fake accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentRequest {
	pub session: SessionId,
	pub request: WireRequest,
	pub at: Instant,
}

#[derive(Default)]
struct State {
	default: Script,
	scripts: HashMap<SessionId, Script>,
	subscribers: HashMap<SessionId, mpsc::UnboundedSender<TransportEvent>>,
	connected: HashSet<SessionId>,
	connects: HashMap<SessionId, usize>,
	handshakes: HashMap<SessionId, usize>,
	sent: Vec<SentRequest>,
}

impl State {
	fn script(&self, session: SessionId) -> &Script {
		self.scripts.get(&session).unwrap_or(&self.default)
	}
}

struct Shared {
	state: Mutex<State>,
	echo_nonce: bool,
}

impl Shared {
	fn emit(&self, session: SessionId, event: TransportEvent) {
		if let Some(tx) = self.state.lock().subscribers.get(&session) {
			let _ = tx.send(event);
		}
	}
}

/// Synthetic preview data returned by [`Responder::Answer`].
pub fn fake_item(key: u64) -> ItemDescriptor {
	ItemDescriptor {
		itemid: key,
		defindex: 7,
		paintindex: 282,
		rarity: 5,
		quality: 4,
		paintwear: 0.15f32.to_bits(),
		paintseed: 661,
		..Default::default()
	}
}

pub struct FakeTransport {
	shared: Arc<Shared>,
}

impl Transport for FakeTransport {
	fn subscribe(&self, session: SessionId) -> mpsc::UnboundedReceiver<TransportEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.shared.state.lock().subscribers.insert(session, tx);
		rx
	}

	fn connect(&self, session: SessionId) -> TransportFuture<'_> {
		Box::pin(async move {
			{
				let mut state = self.shared.state.lock();
				*state.connects.entry(session).or_default() += 1;
				if state.script(session).refuse_connect {
					return Err(Error::Transport(format!("connection refused for session {session}")));
				}
				state.connected.insert(session);
			}
			self.shared.emit(session, TransportEvent::Connected);
			Ok(())
		})
	}

	fn authenticate<'a>(&'a self, session: SessionId, _credentials: &'a Credentials) -> TransportFuture<'a> {
		Box::pin(async move {
			let login = {
				let state = self.shared.state.lock();
				if !state.connected.contains(&session) {
					return Err(Error::NotConnected(session.to_string()));
				}
				state.script(session).login.clone()
			};
			self.shared.emit(session, TransportEvent::LoggedOn(login));
			Ok(())
		})
	}

	fn handshake(&self, session: SessionId, version: u32) -> TransportFuture<'_> {
		Box::pin(async move {
			let welcome = {
				let mut state = self.shared.state.lock();
				if !state.connected.contains(&session) {
					return Err(Error::NotConnected(session.to_string()));
				}
				*state.handshakes.entry(session).or_default() += 1;
				state.script(session).welcome
			};
			if welcome {
				self.shared.emit(session, TransportEvent::Welcome { version });
			}
			Ok(())
		})
	}

	fn send(&self, session: SessionId, request: WireRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let responder = {
				let mut state = self.shared.state.lock();
				if !state.connected.contains(&session) {
					return Err(Error::NotConnected(session.to_string()));
				}
				let responder = state.script(session).responder;
				if responder == Responder::FailSend {
					return Err(Error::Transport(format!("write failed on session {session}")));
				}
				state.sent.push(SentRequest {
					session,
					request,
					at: Instant::now(),
				});
				responder
			};

			let (delay, item) = match responder {
				Responder::Answer { delay } => (delay, Some(fake_item(request.key()))),
				Responder::NotFound { delay } => (delay, None),
				Responder::Silent | Responder::FailSend => return Ok(()),
			};
			let nonce = self.shared.echo_nonce.then_some(request.nonce);
			let shared = Arc::clone(&self.shared);
			tokio::spawn(async move {
				tokio::time::sleep(delay).await;
				shared.emit(
					session,
					TransportEvent::Response {
						key: request.key(),
						nonce,
						item,
					},
				);
			});
			Ok(())
		})
	}

	fn disconnect(&self, session: SessionId) -> TransportFuture<'_> {
		Box::pin(async move {
			let was_connected = self.shared.state.lock().connected.remove(&session);
			if was_connected {
				self.shared.emit(session, TransportEvent::Disconnected { user_initiated: true });
			}
			Ok(())
		})
	}
}

/// Controller for injecting events and inspecting what the broker sent.
#[derive(Clone)]
pub struct FakeTransportController {
	shared: Arc<Shared>,
}

impl FakeTransportController {
	/// Pushes a raw event onto a session's stream.
	pub fn inject(&self, session: usize, event: TransportEvent) {
		self.shared.emit(SessionId(session), event);
	}

	pub fn inject_response(&self, session: usize, key: u64, nonce: Option<u64>, item: Option<ItemDescriptor>) {
		self.inject(session, TransportEvent::Response { key, nonce, item });
	}

	/// Simulates the network dropping a session.
	pub fn drop_connection(&self, session: usize) {
		let id = SessionId(session);
		let was_connected = self.shared.state.lock().connected.remove(&id);
		if was_connected {
			self.shared.emit(id, TransportEvent::Disconnected { user_initiated: false });
		}
	}

	pub fn set_responder(&self, session: usize, responder: Responder) {
		let mut state = self.shared.state.lock();
		let default = state.default.clone();
		state.scripts.entry(SessionId(session)).or_insert(default).responder = responder;
	}

	pub fn sent(&self) -> Vec<SentRequest> {
		self.shared.state.lock().sent.clone()
	}

	/// Takes all sent requests, clearing the buffer.
	pub fn take_sent(&self) -> Vec<SentRequest> {
		std::mem::take(&mut self.shared.state.lock().sent)
	}

	pub fn connect_count(&self, session: usize) -> usize {
		self.shared.state.lock().connects.get(&SessionId(session)).copied().unwrap_or(0)
	}

	pub fn handshake_count(&self, session: usize) -> usize {
		self.shared.state.lock().handshakes.get(&SessionId(session)).copied().unwrap_or(0)
	}

	pub fn is_connected(&self, session: usize) -> bool {
		self.shared.state.lock().connected.contains(&SessionId(session))
	}
}
