//! Newline-delimited JSON frames exchanged with the coordinator gateway.
//!
//! Each frame is one JSON object on its own line, discriminated by `type`:
//! ```json
//! {"type":"preview_request","nonce":7,"s":0,"a":42,"d":9,"m":0}
//! {"type":"preview_response","itemid":42,"nonce":7,"item":{...}}
//! ```

use serde::{Deserialize, Serialize};

use crate::item::{ItemDescriptor, LookupParams};

/// Frames sent from a broker session to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
	LogOn { username: String, password: String },
	LogOff,
	Hello { version: u32 },
	PreviewRequest {
		nonce: u64,
		#[serde(flatten)]
		params: LookupParams,
	},
}

/// Frames pushed from the gateway to a broker session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
	LoggedOn {
		ok: bool,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		result: Option<String>,
	},
	LoggedOff {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		result: Option<String>,
	},
	Welcome { version: u32 },
	ConnectionStatus {
		status: String,
		have_session: bool,
		#[serde(default)]
		wait_seconds: u32,
	},
	LogonFatalError { code: i32, message: String },
	/// Answer to a preview request. `item` is absent when the coordinator has
	/// no data for `itemid`; `nonce` is echoed when the gateway tracks it.
	PreviewResponse {
		itemid: u64,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		nonce: Option<u64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		item: Option<ItemDescriptor>,
	},
	#[serde(other)]
	Unhandled,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn preview_request_flattens_params() {
		let frame = ClientFrame::PreviewRequest {
			nonce: 7,
			params: LookupParams::new(0, 42, 9, 1234),
		};
		let value = serde_json::to_value(&frame).unwrap();
		assert_eq!(value, json!({"type": "preview_request", "nonce": 7, "s": 0, "a": 42, "d": 9, "m": 1234}));
	}

	#[test]
	fn preview_response_without_item_is_not_found() {
		let frame: ServerFrame = serde_json::from_str(r#"{"type":"preview_response","itemid":42}"#).unwrap();
		assert_eq!(
			frame,
			ServerFrame::PreviewResponse {
				itemid: 42,
				nonce: None,
				item: None
			}
		);
	}

	#[test]
	fn unknown_frame_types_are_unhandled() {
		let frame: ServerFrame = serde_json::from_str(r#"{"type":"rank_update"}"#).unwrap();
		assert_eq!(frame, ServerFrame::Unhandled);
	}

	#[test]
	fn logged_on_failure_carries_result() {
		let frame: ServerFrame = serde_json::from_str(r#"{"type":"logged_on","ok":false,"result":"InvalidPassword"}"#).unwrap();
		match frame {
			ServerFrame::LoggedOn { ok, result } => {
				assert!(!ok);
				assert_eq!(result.as_deref(), Some("InvalidPassword"));
			}
			other => panic!("unexpected frame: {other:?}"),
		}
	}
}
