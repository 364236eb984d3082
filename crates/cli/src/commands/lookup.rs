use std::sync::Arc;

use broker::{Broker, LookupOutcome, StatsSnapshot, Unavailable, load_accounts};
use futures::future::join_all;
use inspect_runtime::GatewayTransport;
use serde::Serialize;
use tracing::info;

use super::Settings;
use crate::error::CliError;
use crate::output::{OutputFormat, ResultBuilder, print_result};
use crate::target::parse_target;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRecord {
	pub target: String,
	pub key: u64,
	pub outcome: LookupOutcome,
	/// Float wear decoded from the item's paintwear bits.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wear: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupData {
	pub results: Vec<LookupRecord>,
	pub stats: StatsSnapshot,
}

/// Resolves every target concurrently through one broker.
///
/// Targets are validated before any connection is made.
pub async fn run(settings: &Settings, targets: &[String], format: OutputFormat) -> anyhow::Result<()> {
	let params = targets.iter().map(|raw| parse_target(raw)).collect::<Result<Vec<_>, CliError>>()?;
	let config = settings.broker_config()?;
	let accounts = load_accounts(&settings.accounts)?;

	let transport = Arc::new(GatewayTransport::new(settings.gateway.clone()));
	let broker = Broker::start(config, accounts, transport).await?;
	if let Err(err) = broker.wait_ready().await {
		broker.shutdown().await;
		return Err(err.into());
	}

	info!(target = "inspect.cli", lookups = params.len(), "resolving targets");
	let outcomes = join_all(params.iter().map(|params| broker.lookup(*params))).await;
	broker.shutdown().await;

	let results = targets
		.iter()
		.zip(params.iter())
		.zip(outcomes)
		.map(|((target, params), outcome)| LookupRecord {
			target: target.clone(),
			key: params.key(),
			wear: outcome.item().map(|item| item.wear()),
			outcome,
		})
		.collect();
	let data = LookupData {
		results,
		stats: broker.stats().snapshot(),
	};

	let result = ResultBuilder::new("lookup").data(data).build();
	print_result(&result, format, render_text)?;
	Ok(())
}

fn render_text(data: &LookupData) -> String {
	data.results
		.iter()
		.map(|record| {
			let status = match &record.outcome {
				LookupOutcome::Found(item) => format!(
					"found defindex={} paintindex={} paintseed={} wear={:.10}",
					item.defindex,
					item.paintindex,
					item.paintseed,
					item.wear()
				),
				LookupOutcome::NotFound => "not found".to_string(),
				LookupOutcome::Unavailable(Unavailable::NoSession) => "unavailable: no session".to_string(),
				LookupOutcome::Unavailable(Unavailable::Exhausted { attempts }) => format!("unavailable: no answer after {attempts} attempts"),
				LookupOutcome::Unavailable(Unavailable::Cancelled) => "unavailable: cancelled".to_string(),
			};
			format!("{}\t{}", record.key, status)
		})
		.collect::<Vec<_>>()
		.join("\n")
}
