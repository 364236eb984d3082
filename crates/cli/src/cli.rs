use std::path::PathBuf;

use broker::config::DEFAULT_ACCOUNTS_FILE;
use clap::{Args, Parser, Subcommand};
use inspect_runtime::DEFAULT_GATEWAY_ADDR;

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "inspect")]
#[command(about = "Resolve item inspect links through a pool of coordinator sessions")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Accounts file (JSON array of {username, password})
	#[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_ACCOUNTS_FILE)]
	pub accounts: PathBuf,

	/// Broker settings file (JSON, all fields optional)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Coordinator gateway address
	#[arg(long, global = true, value_name = "HOST:PORT", default_value = DEFAULT_GATEWAY_ADDR)]
	pub gateway: String,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(flatten)]
	pub overrides: ConfigOverrides,

	#[command(subcommand)]
	pub command: Commands,
}

/// Command-line overrides applied on top of the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
	/// Per-attempt answer timeout (ms)
	#[arg(long, global = true, value_name = "MS")]
	pub attempt_timeout_ms: Option<u64>,

	/// Maximum attempts per lookup
	#[arg(long, global = true, value_name = "N")]
	pub max_attempts: Option<usize>,

	/// How long to wait for a session to log in (ms)
	#[arg(long, global = true, value_name = "MS")]
	pub ready_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Look up preview data for one or more items
	#[command(alias = "l")]
	Lookup {
		/// Inspect links or `s,a,d,m` tuples
		#[arg(required = true, value_name = "LINK|S,A,D,M")]
		targets: Vec<String>,
	},

	/// List configured account names
	Accounts,

	/// Print the effective broker configuration
	Config,
}
