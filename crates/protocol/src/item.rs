use serde::{Deserialize, Serialize};

/// Parameters of a preview-data request, as found in an inspect link.
///
/// Exactly one of `s` (owner id) and `m` (market listing id) is non-zero for a
/// well-formed link. `a` is the item id and doubles as the correlation key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupParams {
	#[serde(default)]
	pub s: u64,
	pub a: u64,
	pub d: u64,
	#[serde(default)]
	pub m: u64,
}

impl LookupParams {
	pub fn new(s: u64, a: u64, d: u64, m: u64) -> Self {
		Self { s, a, d, m }
	}

	/// Correlation and deduplication key for this request.
	pub fn key(&self) -> u64 {
		self.a
	}
}

/// A sticker or patch applied to an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
	pub slot: u32,
	pub sticker_id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wear: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scale: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rotation: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub offset_x: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub offset_y: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pattern: Option<u32>,
}

/// Preview data block returned by the coordinator for one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
	pub itemid: u64,
	#[serde(default)]
	pub accountid: u32,
	pub defindex: u32,
	pub paintindex: u32,
	#[serde(default)]
	pub rarity: u32,
	#[serde(default)]
	pub quality: u32,
	/// Raw IEEE-754 bit pattern of the float value; see [`ItemDescriptor::wear`].
	#[serde(default)]
	pub paintwear: u32,
	#[serde(default)]
	pub paintseed: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub killeaterscoretype: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub killeatervalue: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customname: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stickers: Vec<Sticker>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub keychains: Vec<Sticker>,
	#[serde(default)]
	pub inventory: u32,
	#[serde(default)]
	pub origin: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub questid: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dropreason: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub musicindex: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub entindex: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub petindex: Option<u32>,
}

impl ItemDescriptor {
	/// Float value decoded from the paintwear bit pattern.
	pub fn wear(&self) -> f32 {
		f32::from_bits(self.paintwear)
	}

	/// StatTrak items carry a kill-eater counter.
	pub fn is_stattrak(&self) -> bool {
		self.killeatervalue.is_some()
	}
}
