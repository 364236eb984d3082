//! Lookup targets accepted on the command line.

use broker::LookupParams;
use inspect_protocol::{InspectLink, parse_inspect_link};

use crate::error::{CliError, Result};

/// Parses an inspect link or a bare `s,a,d,m` tuple.
pub fn parse_target(raw: &str) -> Result<LookupParams> {
	let raw = raw.trim();
	if raw.starts_with("steam://") {
		return match parse_inspect_link(raw)? {
			InspectLink::Params(params) => Ok(params),
			InspectLink::Encoded(payload) => Err(CliError::EncodedLink(payload)),
		};
	}

	let fields = raw
		.split(',')
		.map(|field| field.trim().parse::<u64>())
		.collect::<std::result::Result<Vec<_>, _>>()
		.map_err(|_| CliError::InvalidTarget(raw.to_string()))?;

	match fields.as_slice() {
		[s, a, d, m] if *a != 0 => Ok(LookupParams::new(*s, *a, *d, *m)),
		_ => Err(CliError::InvalidTarget(raw.to_string())),
	}
}
