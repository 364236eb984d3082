//! Error types for the broker.
//!
//! Expected lookup results (found, not found, unavailable) are values of
//! [`LookupOutcome`](crate::LookupOutcome), not errors. The variants here cover
//! startup, configuration, transport plumbing and invalid state changes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// No credentials were found in the accounts file or the environment.
	#[error("no accounts configured; provide {} or set STEAM_USERNAME/STEAM_PASSWORD", path.display())]
	NoAccounts { path: PathBuf },

	#[error("invalid session transition for {session}: {from} -> {to}")]
	InvalidTransition { session: String, from: SessionState, to: SessionState },

	#[error("transport error: {0}")]
	Transport(String),

	#[error("session {0} is not connected")]
	NotConnected(String),

	#[error("no session became ready within {0:?}")]
	NotReady(Duration),

	#[error("broker has been shut down")]
	Shutdown,

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Failures of the link itself rather than of the request being sent.
	///
	/// The broker moves to the next session either way; only the log level differs.
	pub fn is_transport(&self) -> bool {
		matches!(self, Error::Transport(_) | Error::NotConnected(_) | Error::Io(_))
	}
}
