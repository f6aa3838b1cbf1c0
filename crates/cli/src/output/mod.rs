//! Command output.
//!
//! Every command prints a stream of [`OutputEvent`]s on stdout, one per line.
//! In `json` mode each line is an object tagged by `kind`:
//!
//! ```json
//! {"kind":"joined","topic":"customer:luciano"}
//! {"kind":"status","message":"Driver assigned","source":"reply","request_id":3}
//! {"kind":"failure","message":"booking request failed with HTTP 500: boom","status":500}
//! ```
//!
//! Errors that end the command go to stderr.

#[cfg(test)]
mod tests;

use std::io::{self, Write};

use colored::Colorize;
use serde::Serialize;
use taxi::{BookingOutcome, ConnectionError, OutcomeSource, StatusUpdate};

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// One JSON object per line
	Json,
}

/// Something a command reports while it runs.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputEvent {
	Joined {
		topic: String,
	},
	Status {
		message: String,
		source: &'static str,
		#[serde(skip_serializing_if = "Option::is_none")]
		request_id: Option<u64>,
	},
	Failure {
		message: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		status: Option<u16>,
	},
	ChannelError {
		topic: String,
		reason: String,
	},
}

impl OutputEvent {
	pub fn joined(topic: &str) -> Self {
		OutputEvent::Joined { topic: topic.to_string() }
	}

	pub fn status(update: &StatusUpdate) -> Self {
		OutputEvent::Status {
			message: update.message.clone(),
			source: source_name(update.source),
			request_id: update.request_id.map(|id| id.get()),
		}
	}

	/// Event for the newest write to the outcome slot.
	///
	/// A pending failure takes precedence, since a status write clears it.
	pub fn from_outcome(outcome: &BookingOutcome) -> Option<Self> {
		if let Some(failure) = &outcome.failure {
			return Some(OutputEvent::Failure {
				message: failure.message.clone(),
				status: failure.status,
			});
		}
		outcome.latest.as_ref().map(Self::status)
	}

	pub fn channel_error(err: &ConnectionError) -> Self {
		OutputEvent::ChannelError {
			topic: err.topic.clone(),
			reason: format!("{}: {}", err.kind, err.message),
		}
	}
}

fn source_name(source: OutcomeSource) -> &'static str {
	match source {
		OutcomeSource::Reply => "reply",
		OutcomeSource::Push => "push",
	}
}

/// Formats `event` as a single line, without the newline.
pub fn render(event: &OutputEvent, format: OutputFormat) -> String {
	match format {
		OutputFormat::Json => serde_json::to_string(event).unwrap_or_else(|e| format!(r#"{{"kind":"error","message":"{e}"}}"#)),
		OutputFormat::Text => render_text(event),
	}
}

fn render_text(event: &OutputEvent) -> String {
	match event {
		OutputEvent::Joined { topic } => format!("{} {}", "joined".green().bold(), topic),
		OutputEvent::Status { message, source, .. } => format!("{} {}", format!("[{source}]").cyan(), message),
		OutputEvent::Failure { message, status } => match status {
			Some(status) => format!("{} {} ({status})", "failed".red().bold(), message),
			None => format!("{} {}", "failed".red().bold(), message),
		},
		OutputEvent::ChannelError { topic, reason } => {
			format!("{} {} {}", "channel".yellow().bold(), topic, reason)
		}
	}
}

pub fn print_event(event: &OutputEvent, format: OutputFormat) {
	let mut stdout = io::stdout().lock();
	let _ = writeln!(stdout, "{}", render(event, format));
	let _ = stdout.flush();
}

/// Prints a fatal error and its causes to stderr.
pub fn print_error_stderr(err: &anyhow::Error) {
	eprintln!("{} {}", "error:".red().bold(), err);
	for cause in err.chain().skip(1) {
		eprintln!("  {} {}", "caused by:".dimmed(), cause);
	}
}
