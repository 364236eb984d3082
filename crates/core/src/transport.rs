//! Seam between the broker and whatever speaks the coordinator protocol.
//!
//! The broker never parses wire data. A [`Transport`] drives the network side
//! for every session and reports back through one event stream per session.

use std::future::Future;
use std::pin::Pin;

use inspect_protocol::{Credentials, ItemDescriptor, LookupParams};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::session::SessionId;

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// One outbound preview request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireRequest {
	/// Per-attempt correlation value echoed back by gateways that support it.
	pub nonce: u64,
	pub params: LookupParams,
}

impl WireRequest {
	pub fn key(&self) -> u64 {
		self.params.key()
	}
}

/// Something that happened on a session's connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	Connected,
	/// The connection closed. `user_initiated` is set when the broker asked for it.
	Disconnected { user_initiated: bool },
	/// Result of [`Transport::authenticate`]; the error carries the reason text.
	LoggedOn(std::result::Result<(), String>),
	LoggedOff { reason: Option<String> },
	/// The coordinator accepted the handshake.
	Welcome { version: u32 },
	ConnectionStatus { status: String, have_session: bool },
	LogonFatalError { code: i32, message: String },
	/// Preview answer; `item` is `None` when the coordinator has no data.
	Response {
		key: u64,
		nonce: Option<u64>,
		item: Option<ItemDescriptor>,
	},
}

/// Network side of the broker.
///
/// All operations are fire-and-forget from the broker's point of view: their
/// effects are observed through the events delivered to [`Transport::subscribe`].
pub trait Transport: Send + Sync + 'static {
	/// Event stream for `session`. Called once per session before `connect`.
	fn subscribe(&self, session: SessionId) -> mpsc::UnboundedReceiver<TransportEvent>;

	fn connect(&self, session: SessionId) -> TransportFuture<'_>;

	fn authenticate<'a>(&'a self, session: SessionId, credentials: &'a Credentials) -> TransportFuture<'a>;

	/// Sends the coordinator hello.
	fn handshake(&self, session: SessionId, version: u32) -> TransportFuture<'_>;

	/// Writes one request. `Ok` means handed to the network, not answered.
	fn send(&self, session: SessionId, request: WireRequest) -> TransportFuture<'_>;

	fn disconnect(&self, session: SessionId) -> TransportFuture<'_>;
}
