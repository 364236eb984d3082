use serde::{Deserialize, Serialize};

/// Login credentials for one coordinator account.
///
/// Matches the entries of `steam-accounts.json`:
/// ```json
/// [{ "username": "bot1", "password": "hunter2" }]
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub password: String,
}

impl Credentials {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
		}
	}

	/// Returns `true` when both fields carry a value.
	pub fn is_complete(&self) -> bool {
		!self.username.is_empty() && !self.password.is_empty()
	}
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}
