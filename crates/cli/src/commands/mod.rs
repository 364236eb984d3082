//! Command implementations and dispatch.

pub mod accounts;
pub mod config;
pub mod lookup;

use std::path::PathBuf;

use anyhow::Context;
use broker::BrokerConfig;

use crate::cli::{Cli, Commands, ConfigOverrides};
use crate::output::{ErrorCode, OutputFormat, ResultBuilder, print_result};

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
	pub accounts: PathBuf,
	pub config: Option<PathBuf>,
	pub gateway: String,
	pub overrides: ConfigOverrides,
}

impl Settings {
	/// Config file (or defaults) with command-line overrides applied.
	pub fn broker_config(&self) -> anyhow::Result<BrokerConfig> {
		let mut config = match &self.config {
			Some(path) => BrokerConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
			None => BrokerConfig::default(),
		};
		if let Some(ms) = self.overrides.attempt_timeout_ms {
			config.attempt_timeout_ms = ms;
		}
		if let Some(n) = self.overrides.max_attempts {
			config.max_attempts = n;
		}
		if let Some(ms) = self.overrides.ready_timeout_ms {
			config.ready_timeout_ms = ms;
		}
		config.validate()?;
		Ok(config)
	}
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	let Cli {
		accounts,
		config,
		gateway,
		format,
		overrides,
		command,
		..
	} = cli;
	let settings = Settings {
		accounts,
		config,
		gateway,
		overrides,
	};

	let (name, result) = match command {
		Commands::Lookup { targets } => ("lookup", lookup::run(&settings, &targets, format).await),
		Commands::Accounts => ("accounts", accounts::run(&settings, format)),
		Commands::Config => ("config", config::run(&settings, format)),
	};

	if let Err(err) = &result {
		report_failure(name, err, format);
	}
	result
}

fn report_failure(command: &str, err: &anyhow::Error, format: OutputFormat) {
	let envelope = ResultBuilder::<()>::new(command).error(ErrorCode::classify(err), format!("{err:#}")).build();
	if format != OutputFormat::Text {
		let _ = print_result(&envelope, format, |_| String::new());
	}
}
