//! One authenticated channel to the coordinator.

use std::sync::Arc;
use std::time::Duration;

use inspect_protocol::Credentials;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;

/// Stable index of a session within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub usize);

impl SessionId {
	pub fn index(self) -> usize {
		self.0
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Connection/login state of a session.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> LoggedIn -> Ready
///        ^            |             |           |          |
///        +------------+-------------+-----------+----------+   (network loss)
/// any non-terminal state -> Faulted -> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	Disconnected,
	Connecting,
	Connected,
	LoggedIn,
	Ready,
	Faulted,
}

impl SessionState {
	/// Valid-transition table.
	pub fn can_transition_to(self, next: SessionState) -> bool {
		use SessionState::*;
		match (self, next) {
			(Disconnected, Connecting) => true,
			(Connecting, Connected | Disconnected) => true,
			(Connected, LoggedIn | Disconnected) => true,
			// Logged off keeps the socket but drops the login.
			(LoggedIn, Ready | Connected | Disconnected) => true,
			(Ready, Connected | Disconnected) => true,
			(Faulted, Disconnected) => true,
			(Faulted, Faulted) => false,
			(_, Faulted) => true,
			_ => false,
		}
	}

	/// States in which the coordinator accepts requests.
	pub fn accepts_requests(self) -> bool {
		matches!(self, SessionState::LoggedIn | SessionState::Ready)
	}
}

impl std::fmt::Display for SessionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			SessionState::Disconnected => "disconnected",
			SessionState::Connecting => "connecting",
			SessionState::Connected => "connected",
			SessionState::LoggedIn => "logged_in",
			SessionState::Ready => "ready",
			SessionState::Faulted => "faulted",
		};
		f.write_str(name)
	}
}

pub struct Session {
	id: SessionId,
	label: String,
	credentials: Credentials,
	state: Mutex<SessionState>,
	limiter: RateLimiter,
}

impl Session {
	pub fn new(id: SessionId, credentials: Credentials, min_request_interval: Duration) -> Arc<Self> {
		Arc::new(Self {
			id,
			label: credentials.username.clone(),
			credentials,
			state: Mutex::new(SessionState::Disconnected),
			limiter: RateLimiter::new(min_request_interval),
		})
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	/// Human-readable name used in logs (the account name).
	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	pub fn state(&self) -> SessionState {
		*self.state.lock()
	}

	pub fn is_ready(&self) -> bool {
		self.state().accepts_requests()
	}

	/// Moves to `next`, returning the previous state.
	///
	/// Transitions outside the table are rejected and leave the state untouched.
	pub fn transition(&self, next: SessionState) -> Result<SessionState> {
		let mut state = self.state.lock();
		let previous = *state;
		if !previous.can_transition_to(next) {
			warn!(
				target = "inspect.session",
				session = %self.label,
				from = %previous,
				to = %next,
				"rejected session transition"
			);
			return Err(Error::InvalidTransition {
				session: self.label.clone(),
				from: previous,
				to: next,
			});
		}
		*state = next;
		debug!(target = "inspect.session", session = %self.label, from = %previous, to = %next, "session transition");
		Ok(previous)
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("label", &self.label)
			.field("state", &self.state())
			.field("limiter", &self.limiter)
			.finish()
	}
}
