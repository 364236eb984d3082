//! Round-robin session selection.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use inspect_protocol::Credentials;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::session::{Session, SessionId};

/// Ordered set of sessions with a shared rotating cursor.
///
/// The pool does not look at readiness; callers skip unready sessions by
/// adding them to the exclusion set.
#[derive(Debug)]
pub struct SessionPool {
	sessions: Vec<Arc<Session>>,
	cursor: Mutex<usize>,
}

impl SessionPool {
	pub fn new(sessions: Vec<Arc<Session>>) -> Self {
		Self {
			sessions,
			cursor: Mutex::new(0),
		}
	}

	/// Builds one session per credential pair, in order.
	pub fn from_credentials(accounts: Vec<Credentials>, min_request_interval: Duration) -> Result<Self> {
		if accounts.is_empty() {
			return Err(Error::NoAccounts {
				path: PathBuf::from(crate::config::DEFAULT_ACCOUNTS_FILE),
			});
		}

		let sessions = accounts
			.into_iter()
			.enumerate()
			.map(|(idx, creds)| Session::new(SessionId(idx), creds, min_request_interval))
			.collect();
		Ok(Self::new(sessions))
	}

	/// Returns the next session after the cursor that is not in `excluding`.
	///
	/// The cursor moves past the returned session; it does not move when
	/// every session is excluded.
	pub fn next(&self, excluding: &HashSet<SessionId>) -> Option<Arc<Session>> {
		let len = self.sessions.len();
		let mut cursor = self.cursor.lock();
		for offset in 0..len {
			let idx = (*cursor + offset) % len;
			let session = &self.sessions[idx];
			if !excluding.contains(&session.id()) {
				*cursor = (idx + 1) % len;
				return Some(Arc::clone(session));
			}
		}
		None
	}

	pub fn get(&self, id: SessionId) -> Option<&Arc<Session>> {
		self.sessions.get(id.index())
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<Session>> {
		self.sessions.iter()
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	pub fn ready_count(&self) -> usize {
		self.sessions.iter().filter(|s| s.is_ready()).count()
	}

	/// Index the next selection starts from.
	pub fn cursor(&self) -> usize {
		*self.cursor.lock()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pool(n: usize) -> SessionPool {
		let accounts = (0..n).map(|i| Credentials::new(format!("bot{i}"), "pw")).collect();
		SessionPool::from_credentials(accounts, Duration::from_secs(1)).unwrap()
	}

	#[test]
	fn empty_account_list_is_rejected() {
		let err = SessionPool::from_credentials(Vec::new(), Duration::from_secs(1)).unwrap_err();
		assert!(matches!(err, Error::NoAccounts { .. }));
	}

	#[test]
	fn rotates_round_robin() {
		let pool = pool(3);
		let none = HashSet::new();
		let picked: Vec<usize> = (0..7).map(|_| pool.next(&none).unwrap().id().index()).collect();
		assert_eq!(picked, vec![0, 1, 2, 0, 1, 2, 0]);
		assert_eq!(pool.cursor(), 1);
	}

	#[test]
	fn skips_excluded_sessions() {
		let pool = pool(3);
		let excluded: HashSet<_> = [SessionId(0), SessionId(1)].into_iter().collect();
		assert_eq!(pool.next(&excluded).unwrap().id(), SessionId(2));
		assert_eq!(pool.cursor(), 0);
		assert_eq!(pool.next(&excluded).unwrap().id(), SessionId(2));
	}

	#[test]
	fn exhausted_exclusion_returns_none_without_moving_cursor() {
		let pool = pool(2);
		pool.next(&HashSet::new());
		let all: HashSet<_> = pool.iter().map(|s| s.id()).collect();
		assert!(pool.next(&all).is_none());
		assert_eq!(pool.cursor(), 1);
	}

	#[test]
	fn retry_sequence_never_repeats_a_session() {
		let pool = pool(4);
		pool.next(&HashSet::new());

		let mut tried = HashSet::new();
		while let Some(session) = pool.next(&tried) {
			assert!(tried.insert(session.id()), "session {} chosen twice", session.id());
		}
		assert_eq!(tried.len(), 4);
	}
}
