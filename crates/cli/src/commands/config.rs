use std::path::PathBuf;

use broker::BrokerConfig;
use serde::Serialize;

use super::Settings;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
	pub gateway: String,
	pub accounts_file: PathBuf,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub config_file: Option<PathBuf>,
	pub broker: BrokerConfig,
}

pub fn run(settings: &Settings, format: OutputFormat) -> anyhow::Result<()> {
	let data = EffectiveConfig {
		gateway: settings.gateway.clone(),
		accounts_file: settings.accounts.clone(),
		config_file: settings.config.clone(),
		broker: settings.broker_config()?,
	};
	let result = ResultBuilder::new("config").data(data).build();
	print_result(&result, format, |data| {
		serde_json::to_string_pretty(&data.broker).unwrap_or_default()
	})?;
	Ok(())
}
