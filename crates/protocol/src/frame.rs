//! Phoenix Channels V2 frame encoding.
//!
//! The V2 JSON serializer sends every message as a five element array:
//!
//! ```text
//! [join_ref, ref, topic, event, payload]
//! ```
//!
//! `join_ref` identifies the channel join a message belongs to, `ref`
//! correlates a client request with its `phx_reply`. Server pushes carry a
//! `null` ref.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events;

/// A single message on the channel socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	/// Ref of the join this frame belongs to.
	pub join_ref: Option<String>,
	/// Request ref, echoed back in the matching `phx_reply`.
	pub msg_ref: Option<String>,
	pub topic: String,
	pub event: String,
	pub payload: Value,
}

type RawFrame = (Option<String>, Option<String>, String, String, Value);

impl Serialize for Frame {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		(&self.join_ref, &self.msg_ref, &self.topic, &self.event, &self.payload).serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Frame {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let (join_ref, msg_ref, topic, event, payload) = RawFrame::deserialize(deserializer)?;
		Ok(Self {
			join_ref,
			msg_ref,
			topic,
			event,
			payload,
		})
	}
}

impl Frame {
	/// Creates a frame with no refs (a server push).
	pub fn push(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
		Self {
			join_ref: None,
			msg_ref: None,
			topic: topic.into(),
			event: event.into(),
			payload,
		}
	}

	/// Creates a client request frame.
	pub fn request(
		join_ref: Option<String>,
		msg_ref: String,
		topic: impl Into<String>,
		event: impl Into<String>,
		payload: Value,
	) -> Self {
		Self {
			join_ref,
			msg_ref: Some(msg_ref),
			topic: topic.into(),
			event: event.into(),
			payload,
		}
	}

	/// Builds the `phx_reply` for this frame with the given status.
	///
	/// Used by in-memory servers in tests and demos.
	pub fn reply(&self, status: ReplyStatus, response: Value) -> Frame {
		Frame {
			join_ref: self.join_ref.clone(),
			msg_ref: self.msg_ref.clone(),
			topic: self.topic.clone(),
			event: events::PHX_REPLY.to_string(),
			payload: serde_json::to_value(ReplyPayload { status, response }).unwrap_or(Value::Null),
		}
	}

	pub fn is_reply(&self) -> bool {
		self.event == events::PHX_REPLY
	}
}

/// Status field of a `phx_reply` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
	Ok,
	Error,
	/// Any status this client does not know (forward-compatible).
	#[serde(other)]
	Other,
}

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload {
	pub status: ReplyStatus,
	#[serde(default)]
	pub response: Value,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn frame_serializes_as_five_element_array() {
		let frame = Frame::request(
			Some("1".into()),
			"1".into(),
			"customer:luciano",
			events::PHX_JOIN,
			json!({"token": "123"}),
		);
		let value = serde_json::to_value(&frame).unwrap();
		assert_eq!(value, json!(["1", "1", "customer:luciano", "phx_join", {"token": "123"}]));
	}

	#[test]
	fn server_push_parses_with_null_refs() {
		let raw = r#"[null, null, "customer:luciano", "booking_request", {"mensaje": "hola"}]"#;
		let frame: Frame = serde_json::from_str(raw).unwrap();
		assert_eq!(frame.join_ref, None);
		assert_eq!(frame.msg_ref, None);
		assert_eq!(frame.topic, "customer:luciano");
		assert_eq!(frame.event, "booking_request");
		assert_eq!(frame.payload["mensaje"], "hola");
	}

	#[test]
	fn reply_echoes_refs_and_wraps_status() {
		let join = Frame::request(Some("3".into()), "3".into(), "customer:a", events::PHX_JOIN, json!({}));
		let reply = join.reply(ReplyStatus::Error, json!({"reason": "unauthorized"}));

		assert!(reply.is_reply());
		assert_eq!(reply.msg_ref.as_deref(), Some("3"));
		let payload: ReplyPayload = serde_json::from_value(reply.payload).unwrap();
		assert_eq!(payload.status, ReplyStatus::Error);
		assert_eq!(payload.response["reason"], "unauthorized");
	}

	#[test]
	fn unknown_reply_status_is_tolerated() {
		let payload: ReplyPayload = serde_json::from_value(json!({"status": "timeout"})).unwrap();
		assert_eq!(payload.status, ReplyStatus::Other);
		assert_eq!(payload.response, Value::Null);
	}

	#[test]
	fn short_array_is_rejected() {
		let result = serde_json::from_str::<Frame>(r#"[null, "1", "phoenix"]"#);
		assert!(result.is_err());
	}
}
