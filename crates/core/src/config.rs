//! Client configuration.
//!
//! Every endpoint and credential the client uses lives here. Values can be
//! loaded from a JSON file (camelCase keys) and any missing key falls back to
//! the local development defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default REST root of the booking service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Default channel socket endpoint.
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:4000/socket/websocket";

/// Default channel namespace for customers.
pub const DEFAULT_TOPIC_PREFIX: &str = "customer";

/// Default static join token.
pub const DEFAULT_AUTH_TOKEN: &str = "123";

/// Path of the booking-creation endpoint under `baseUrl`.
pub const BOOKINGS_PATH: &str = "/api/bookings";

/// Booking client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
	/// REST root, e.g. `http://localhost:4000`.
	pub base_url: String,
	/// Channel socket endpoint. `vsn=2.0.0` is appended when missing.
	pub socket_url: String,
	/// Role part of the channel topic (`<topicPrefix>:<identity>`).
	pub topic_prefix: String,
	/// Token sent with every join.
	pub auth_token: String,
	/// Socket heartbeat period; `0` disables heartbeats.
	pub heartbeat_interval_ms: u64,
	/// How long a join may stay pending before it fails. Must be non-zero.
	pub join_timeout_ms: u64,
	/// Overall timeout for a booking submission.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_timeout_ms: Option<u64>,
	/// Ignore pushes and replies that belong to an older submission.
	pub correlate_pushes: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.to_string(),
			socket_url: DEFAULT_SOCKET_URL.to_string(),
			topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
			auth_token: DEFAULT_AUTH_TOKEN.to_string(),
			heartbeat_interval_ms: 30_000,
			join_timeout_ms: 10_000,
			request_timeout_ms: None,
			correlate_pushes: false,
		}
	}
}

impl ClientConfig {
	/// Loads a JSON config file. Missing keys take their defaults.
	pub fn from_file(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		let config: ClientConfig = serde_json::from_str(&raw)
			.map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
		config.validate()?;
		Ok(config)
	}

	/// Checks URLs, the topic prefix and the timeouts.
	pub fn validate(&self) -> Result<()> {
		let base = parse_url("baseUrl", &self.base_url)?;
		if !matches!(base.scheme(), "http" | "https") {
			return Err(Error::Config(format!("baseUrl must be http(s): {}", self.base_url)));
		}

		let socket = parse_url("socketUrl", &self.socket_url)?;
		if !matches!(socket.scheme(), "ws" | "wss") {
			return Err(Error::Config(format!("socketUrl must be ws(s): {}", self.socket_url)));
		}

		if self.topic_prefix.is_empty() || self.topic_prefix.contains(':') {
			return Err(Error::Config(format!("invalid topicPrefix: {:?}", self.topic_prefix)));
		}

		if self.join_timeout_ms == 0 {
			return Err(Error::Config("joinTimeoutMs must be greater than 0".to_string()));
		}
		if self.request_timeout_ms == Some(0) {
			return Err(Error::Config("requestTimeoutMs must be greater than 0".to_string()));
		}
		Ok(())
	}

	/// Full URL of the booking-creation endpoint.
	pub fn bookings_url(&self) -> String {
		format!("{}{BOOKINGS_PATH}", self.base_url.trim_end_matches('/'))
	}

	/// Socket URL with the serializer version query parameter.
	pub fn websocket_url(&self) -> Result<String> {
		let mut url = parse_url("socketUrl", &self.socket_url)?;
		if !url.query_pairs().any(|(k, _)| k == "vsn") {
			url.query_pairs_mut().append_pair("vsn", taxi_protocol::PROTOCOL_VSN);
		}
		Ok(url.into())
	}

	pub fn heartbeat_interval(&self) -> Option<Duration> {
		Some(Duration::from_millis(self.heartbeat_interval_ms)).filter(|d| !d.is_zero())
	}

	pub fn join_timeout(&self) -> Duration {
		Duration::from_millis(self.join_timeout_ms)
	}

	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
	Url::parse(raw).map_err(|e| Error::Config(format!("{field} {raw:?}: {e}")))
}
