//! Result envelope printed by every command.

use std::io::{self, Write};
use std::time::Instant;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::CliError;

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Pretty-printed JSON
	#[default]
	Json,
	/// One compact JSON document per line
	Ndjson,
	/// Human-readable text
	Text,
}

/// The envelope returned by all commands.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	InvalidInput,
	NoAccounts,
	NotReady,
	ConfigError,
	IoError,
	InternalError,
}

impl ErrorCode {
	/// Best-fitting code for a command failure.
	pub fn classify(err: &anyhow::Error) -> Self {
		if let Some(err) = err.downcast_ref::<CliError>() {
			return match err {
				CliError::InvalidTarget(_) | CliError::EncodedLink(_) | CliError::Link(_) => ErrorCode::InvalidInput,
				CliError::Broker(err) => Self::from_broker(err),
				CliError::Io(_) => ErrorCode::IoError,
				CliError::Json(_) => ErrorCode::ConfigError,
			};
		}
		if let Some(err) = err.downcast_ref::<broker::Error>() {
			return Self::from_broker(err);
		}
		ErrorCode::InternalError
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::NoAccounts => "NO_ACCOUNTS",
			ErrorCode::NotReady => "NOT_READY",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		}
	}

	fn from_broker(err: &broker::Error) -> Self {
		match err {
			broker::Error::NoAccounts { .. } => ErrorCode::NoAccounts,
			broker::Error::NotReady(_) => ErrorCode::NotReady,
			broker::Error::Config(_) | broker::Error::Json(_) => ErrorCode::ConfigError,
			broker::Error::Io(_) => ErrorCode::IoError,
			_ => ErrorCode::InternalError,
		}
	}
}

/// Builder for constructing command results.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	started: Instant,
	data: Option<T>,
	error: Option<CommandError>,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			started: Instant::now(),
			data: None,
			error: None,
		}
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			ok: self.error.is_none(),
			command: self.command,
			data: self.data,
			error: self.error,
			duration_ms: Some(self.started.elapsed().as_millis() as u64),
		}
	}
}

/// Writes `result` to stdout in `format`. `text` renders the data with `render`.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat, render: impl Fn(&T) -> String) -> io::Result<()> {
	let mut stdout = io::stdout().lock();
	match format {
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut stdout, result)?;
			writeln!(stdout)?;
		}
		OutputFormat::Ndjson => {
			serde_json::to_writer(&mut stdout, result)?;
			writeln!(stdout)?;
		}
		OutputFormat::Text => {
			if let Some(data) = &result.data {
				writeln!(stdout, "{}", render(data))?;
			}
			if let Some(error) = &result.error {
				writeln!(stdout, "error [{}]: {}", error.code.as_str(), error.message)?;
			}
		}
	}
	stdout.flush()
}
