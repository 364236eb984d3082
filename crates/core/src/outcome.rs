use inspect_protocol::ItemDescriptor;
use serde::Serialize;

/// Result of a lookup, delivered identically to every caller joined on a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LookupOutcome {
	/// The coordinator answered with preview data.
	Found(ItemDescriptor),
	/// The coordinator answered but has no data for the key.
	NotFound,
	/// The broker could not get an answer.
	Unavailable(Unavailable),
}

/// Why a lookup produced no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
	/// No session was ready to carry the request.
	NoSession,
	/// Every attempt in the budget timed out or failed to send.
	Exhausted { attempts: usize },
	/// The caller driving the request went away before it finished.
	Cancelled,
}

impl LookupOutcome {
	pub fn item(&self) -> Option<&ItemDescriptor> {
		match self {
			LookupOutcome::Found(item) => Some(item),
			_ => None,
		}
	}

	pub fn into_item(self) -> Option<ItemDescriptor> {
		match self {
			LookupOutcome::Found(item) => Some(item),
			_ => None,
		}
	}

	/// `true` for answers from the coordinator, found or not.
	pub fn is_answer(&self) -> bool {
		!matches!(self, LookupOutcome::Unavailable(_))
	}
}

impl From<Option<ItemDescriptor>> for LookupOutcome {
	fn from(item: Option<ItemDescriptor>) -> Self {
		match item {
			Some(item) => LookupOutcome::Found(item),
			None => LookupOutcome::NotFound,
		}
	}
}
