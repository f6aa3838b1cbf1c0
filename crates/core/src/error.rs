//! Error types for the booking client.

use std::fmt;

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sessions, the dispatcher, and configuration.
#[derive(Debug, Error)]
pub enum Error {
	/// Identity was empty or whitespace.
	#[error("invalid identity: {0:?}")]
	InvalidIdentity(String),

	/// An operation needed an open channel session and there was none.
	#[error("no channel session is open")]
	NoSession,

	/// Channel join failed or the channel dropped.
	#[error(transparent)]
	Connection(#[from] ConnectionError),

	/// Booking submission failed.
	#[error(transparent)]
	Submission(#[from] SubmissionError),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Runtime(#[from] taxi_runtime::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true for channel-level failures.
	pub fn is_connection(&self) -> bool {
		matches!(self, Error::Connection(_) | Error::Runtime(_))
	}

	/// Returns true for booking submission failures, including malformed replies.
	pub fn is_submission(&self) -> bool {
		matches!(self, Error::Submission(_))
	}

	/// Returns true when the booking reply lacked a usable status message.
	pub fn is_malformed_response(&self) -> bool {
		matches!(self, Error::Submission(SubmissionError::Malformed(_)))
	}
}

/// Why a channel session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
	/// Server answered the join with `status: "error"`.
	JoinRejected,
	/// No join reply within the configured timeout.
	JoinTimeout,
	/// Join could not be sent or the reply was unreadable.
	JoinFailed,
	/// Server reported `phx_error` for the channel.
	ChannelCrashed,
	/// Server sent `phx_close` for the channel.
	ChannelClosed,
	/// The socket under the channel went away.
	Disconnected,
}

impl fmt::Display for ConnectionErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			ConnectionErrorKind::JoinRejected => "join rejected",
			ConnectionErrorKind::JoinTimeout => "join timed out",
			ConnectionErrorKind::JoinFailed => "join failed",
			ConnectionErrorKind::ChannelCrashed => "channel crashed",
			ConnectionErrorKind::ChannelClosed => "channel closed by server",
			ConnectionErrorKind::Disconnected => "socket disconnected",
		};
		f.write_str(text)
	}
}

/// Channel failure, broadcast to observers and returned from [`ChannelSession::joined`].
///
/// Cloneable so it can travel over a broadcast channel.
///
/// [`ChannelSession::joined`]: crate::ChannelSession::joined
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("channel '{topic}' {kind}: {message}")]
pub struct ConnectionError {
	pub identity: String,
	pub topic: String,
	pub kind: ConnectionErrorKind,
	pub message: String,
}

impl ConnectionError {
	pub fn new(identity: &str, topic: &str, kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
		Self {
			identity: identity.to_string(),
			topic: topic.to_string(),
			kind,
			message: message.into(),
		}
	}

	/// Classifies a runtime error returned by a join attempt.
	pub fn from_join(identity: &str, topic: &str, err: &taxi_runtime::Error) -> Self {
		let kind = match err {
			taxi_runtime::Error::Rejected { .. } => ConnectionErrorKind::JoinRejected,
			taxi_runtime::Error::Timeout(_) => ConnectionErrorKind::JoinTimeout,
			taxi_runtime::Error::ChannelClosed => ConnectionErrorKind::Disconnected,
			_ => ConnectionErrorKind::JoinFailed,
		};
		let message = err.rejection_reason().map(str::to_string).unwrap_or_else(|| err.to_string());
		Self::new(identity, topic, kind, message)
	}
}

/// Booking submission failure.
#[derive(Debug, Error)]
pub enum SubmissionError {
	/// Endpoint answered with a non-2xx status.
	#[error("booking request failed with HTTP {status}: {body}")]
	Status { status: u16, body: String },

	/// Request never completed (connect, TLS, timeout, body read).
	#[error("booking request failed: {0}")]
	Network(#[source] reqwest::Error),

	/// 2xx reply without a string `mensaje`.
	#[error("malformed booking response: {0}")]
	Malformed(String),
}

impl SubmissionError {
	/// HTTP status for [`Status`](Self::Status) failures.
	pub fn status(&self) -> Option<u16> {
		match self {
			SubmissionError::Status { status, .. } => Some(*status),
			SubmissionError::Network(err) => err.status().map(|s| s.as_u16()),
			SubmissionError::Malformed(_) => None,
		}
	}
}
