//! Inspect link parsing.
//!
//! Two link shapes exist:
//! * `... csgo_econ_action_preview S<owner>A<item>D<token>` (or `M<listing>` for market items)
//! * `... csgo_econ_action_preview <HEX>` carrying an encoded preview block
//!
//! Only the first resolves to [`LookupParams`]; the encoded form is reported
//! so callers can decode it elsewhere.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::item::LookupParams;

const LINK_PREFIX: &str = r"steam://rungame/730/76561202255233023/ csgo_econ_action_preview ";

static PARAMS_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(&format!(r"{}([SM])(\d+)A(\d+)D(\d+)", regex_lite::escape(LINK_PREFIX))).expect("inspect link regex should compile"));

static ENCODED_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(&format!(r"{}([0-9A-F]+)", regex_lite::escape(LINK_PREFIX))).expect("encoded link regex should compile"));

/// A successfully recognised inspect link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectLink {
	/// Link that must be resolved through the coordinator.
	Params(LookupParams),
	/// Link embedding its own hex-encoded preview block.
	Encoded(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
	#[error("not an inspect link: {0}")]
	Unrecognized(String),
	#[error("inspect link parameter out of range: {0}")]
	OutOfRange(String),
}

/// Parses an inspect link, accepting `%20` and `+` as the separator before the payload.
pub fn parse_inspect_link(url: &str) -> Result<InspectLink, LinkError> {
	let decoded = url.trim().replace("%20", " ").replace('+', " ");

	if let Some(caps) = PARAMS_REGEX.captures(&decoded) {
		let number = |idx: usize| -> Result<u64, LinkError> { caps[idx].parse::<u64>().map_err(|_| LinkError::OutOfRange(caps[idx].to_string())) };

		let first = number(2)?;
		let (s, m) = if &caps[1] == "S" { (first, 0) } else { (0, first) };
		return Ok(InspectLink::Params(LookupParams::new(s, number(3)?, number(4)?, m)));
	}

	if let Some(caps) = ENCODED_REGEX.captures(&decoded) {
		return Ok(InspectLink::Encoded(caps[1].to_string()));
	}

	Err(LinkError::Unrecognized(url.to_string()))
}
