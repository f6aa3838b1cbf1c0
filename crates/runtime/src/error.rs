//! Error types for the channel runtime.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the channel socket.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish the socket connection.
	#[error("Failed to connect to channel socket: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (socket read/write).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Frame could not be interpreted.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Server answered a request with `status: "error"`.
	#[error("{event} on '{topic}' rejected: {response}")]
	Rejected {
		topic: String,
		event: String,
		/// Server-provided `response` object, usually `{reason}`.
		response: Value,
	},

	/// Timeout waiting for a reply.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Socket closed before a reply arrived.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the server rejected the request.
	pub fn is_rejected(&self) -> bool {
		matches!(self, Error::Rejected { .. })
	}

	/// Returns the server's `reason` for a rejection, if any.
	pub fn rejection_reason(&self) -> Option<&str> {
		match self {
			Error::Rejected { response, .. } => response.get("reason").and_then(Value::as_str),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn rejection_exposes_reason() {
		let err = Error::Rejected {
			topic: "customer:luciano".into(),
			event: "phx_join".into(),
			response: json!({"reason": "unauthorized"}),
		};
		assert!(err.is_rejected());
		assert!(!err.is_timeout());
		assert_eq!(err.rejection_reason(), Some("unauthorized"));
		assert!(err.to_string().contains("customer:luciano"));
	}

	#[test]
	fn non_rejection_has_no_reason() {
		assert_eq!(Error::ChannelClosed.rejection_reason(), None);
		assert!(Error::Timeout("join".into()).is_timeout());
	}
}
