use inspect_protocol::LinkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid lookup target '{0}': expected an inspect link or s,a,d,m")]
	InvalidTarget(String),

	#[error("encoded inspect links are not supported: {0}")]
	EncodedLink(String),

	#[error(transparent)]
	Link(#[from] LinkError),

	#[error(transparent)]
	Broker(#[from] broker::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}
