use broker::load_accounts;
use serde::Serialize;
use tracing::info;

use super::Settings;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsData {
	pub count: usize,
	pub accounts: Vec<String>,
}

/// Lists account names. Passwords are never printed.
pub fn run(settings: &Settings, format: OutputFormat) -> anyhow::Result<()> {
	let accounts = load_accounts(&settings.accounts)?;
	info!(target = "inspect.cli", count = accounts.len(), "accounts loaded");

	let data = AccountsData {
		count: accounts.len(),
		accounts: accounts.into_iter().map(|creds| creds.username).collect(),
	};
	let result = ResultBuilder::new("accounts").data(data).build();
	print_result(&result, format, |data| data.accounts.join("\n"))?;
	Ok(())
}
