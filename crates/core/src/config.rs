//! Broker settings and account loading.

use std::fs;
use std::path::Path;
use std::time::Duration;

use inspect_protocol::Credentials;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Accounts file looked up in the working directory when no path is given.
pub const DEFAULT_ACCOUNTS_FILE: &str = "steam-accounts.json";
pub const USERNAME_ENV: &str = "STEAM_USERNAME";
pub const PASSWORD_ENV: &str = "STEAM_PASSWORD";

/// Timing and retry settings. Every field has a default, so a partial JSON
/// file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Minimum spacing between two sends on the same session.
	pub min_request_interval_ms: u64,
	/// How long one attempt waits for an answer before rotating.
	pub attempt_timeout_ms: u64,
	/// Upper bound on attempts per lookup (also capped by the pool size).
	pub max_attempts: usize,
	pub reconnect_delay_ms: u64,
	/// Pause between login and the coordinator hello.
	pub handshake_delay_ms: u64,
	pub ready_timeout_ms: u64,
	pub handshake_version: u32,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			min_request_interval_ms: 1_000,
			attempt_timeout_ms: 2_000,
			max_attempts: 3,
			reconnect_delay_ms: 5_000,
			handshake_delay_ms: 5_000,
			ready_timeout_ms: 15_000,
			handshake_version: 2_000_202,
		}
	}
}

impl BrokerConfig {
	/// Reads a JSON config file; missing fields take their defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.max_attempts == 0 {
			return Err(Error::Config("max_attempts must be at least 1".into()));
		}
		if self.attempt_timeout_ms == 0 {
			return Err(Error::Config("attempt_timeout_ms must be non-zero".into()));
		}
		Ok(())
	}

	pub fn min_request_interval(&self) -> Duration {
		Duration::from_millis(self.min_request_interval_ms)
	}

	pub fn attempt_timeout(&self) -> Duration {
		Duration::from_millis(self.attempt_timeout_ms)
	}

	pub fn reconnect_delay(&self) -> Duration {
		Duration::from_millis(self.reconnect_delay_ms)
	}

	pub fn handshake_delay(&self) -> Duration {
		Duration::from_millis(self.handshake_delay_ms)
	}

	pub fn ready_timeout(&self) -> Duration {
		Duration::from_millis(self.ready_timeout_ms)
	}
}

/// Loads credentials from `path`, falling back to the process environment.
pub fn load_accounts(path: &Path) -> Result<Vec<Credentials>> {
	load_accounts_with(path, |name| std::env::var(name).ok())
}

/// Like [`load_accounts`] with an injectable environment lookup.
///
/// A missing, unparsable or empty file falls through to the
/// `STEAM_USERNAME`/`STEAM_PASSWORD` pair; incomplete entries are dropped.
pub fn load_accounts_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Vec<Credentials>> {
	match fs::read_to_string(path) {
		Ok(content) => match serde_json::from_str::<Vec<Credentials>>(&content) {
			Ok(accounts) => {
				let total = accounts.len();
				let accounts: Vec<_> = accounts.into_iter().filter(Credentials::is_complete).collect();
				if accounts.len() < total {
					warn!(
						target = "inspect.config",
						path = %path.display(),
						skipped = total - accounts.len(),
						"skipping accounts without username or password"
					);
				}
				if !accounts.is_empty() {
					info!(target = "inspect.config", path = %path.display(), count = accounts.len(), "loaded accounts");
					return Ok(accounts);
				}
			}
			Err(err) => {
				warn!(target = "inspect.config", path = %path.display(), error = %err, "failed to parse accounts file");
			}
		},
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
		Err(err) => {
			warn!(target = "inspect.config", path = %path.display(), error = %err, "failed to read accounts file");
		}
	}

	match (env(USERNAME_ENV), env(PASSWORD_ENV)) {
		(Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
			info!(target = "inspect.config", "using account from environment");
			Ok(vec![Credentials::new(username, password)])
		}
		_ => Err(Error::NoAccounts { path: path.to_path_buf() }),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |name| map.get(name).cloned()
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = BrokerConfig::default();
		assert_eq!(config.min_request_interval(), Duration::from_secs(1));
		assert_eq!(config.attempt_timeout(), Duration::from_secs(2));
		assert_eq!(config.max_attempts, 3);
		assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
		assert_eq!(config.handshake_delay(), Duration::from_secs(5));
		assert_eq!(config.ready_timeout(), Duration::from_secs(15));
	}

	#[test]
	fn partial_config_file_keeps_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("broker.json");
		fs::write(&path, r#"{"attempt_timeout_ms": 500}"#).unwrap();

		let config = BrokerConfig::load(&path).unwrap();
		assert_eq!(config.attempt_timeout(), Duration::from_millis(500));
		assert_eq!(config.max_attempts, 3);
	}

	#[test]
	fn zero_attempts_is_rejected() {
		let config = BrokerConfig {
			max_attempts: 0,
			..Default::default()
		};
		assert!(matches!(config.validate(), Err(Error::Config(_))));
	}

	#[test]
	fn accounts_file_wins_over_environment() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(DEFAULT_ACCOUNTS_FILE);
		fs::write(&path, r#"[{"username":"a","password":"1"},{"username":"b","password":"2"}]"#).unwrap();

		let accounts = load_accounts_with(&path, env_of(&[(USERNAME_ENV, "env"), (PASSWORD_ENV, "pw")])).unwrap();
		let names: Vec<_> = accounts.iter().map(|c| c.username.as_str()).collect();
		assert_eq!(names, vec!["a", "b"]);
	}

	#[test]
	fn incomplete_entries_are_dropped() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(DEFAULT_ACCOUNTS_FILE);
		fs::write(&path, r#"[{"username":"a"},{"username":"b","password":"2"}]"#).unwrap();

		let accounts = load_accounts_with(&path, env_of(&[])).unwrap();
		assert_eq!(accounts.len(), 1);
		assert_eq!(accounts[0].username, "b");
	}

	#[test]
	fn falls_back_to_environment() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("missing.json");
		let accounts = load_accounts_with(&missing, env_of(&[(USERNAME_ENV, "env"), (PASSWORD_ENV, "pw")])).unwrap();
		assert_eq!(accounts, vec![Credentials::new("env", "pw")]);

		let broken = dir.path().join("broken.json");
		fs::write(&broken, "not json").unwrap();
		let accounts = load_accounts_with(&broken, env_of(&[(USERNAME_ENV, "env"), (PASSWORD_ENV, "pw")])).unwrap();
		assert_eq!(accounts.len(), 1);
	}

	#[test]
	fn nothing_configured_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(DEFAULT_ACCOUNTS_FILE);
		fs::write(&path, "[]").unwrap();

		let err = load_accounts_with(&path, env_of(&[(USERNAME_ENV, "only-user")])).unwrap_err();
		assert!(matches!(err, Error::NoAccounts { .. }));
		assert!(err.to_string().contains("STEAM_USERNAME"));
	}
}
