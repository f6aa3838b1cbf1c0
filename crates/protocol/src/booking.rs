//! Booking payloads exchanged over REST and pushed on the channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Builds the channel topic for a role and identity, e.g. `customer:luciano`.
pub fn topic_for(role: &str, identity: &str) -> String {
	format!("{role}:{identity}")
}

/// Payload of the `phx_join` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
	/// Opaque credential checked by the server at join time.
	pub token: String,
}

/// JSON body of `POST /api/bookings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingBody {
	pub pickup_address: String,
	pub dropoff_address: String,
	pub username: String,
	/// Present only when push correlation is enabled.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<u64>,
}

/// Status message carried by booking replies and `booking_request` pushes.
///
/// Only `mensaje` is required; any other field the server sends is kept in
/// [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
	/// Human-readable status shown to the customer.
	pub mensaje: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<u64>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl StatusMessage {
	/// Parses a status message out of an arbitrary JSON payload.
	///
	/// Returns [`None`] when `mensaje` is missing or not a string.
	pub fn from_payload(payload: &Value) -> Option<Self> {
		let mensaje = payload.get("mensaje")?.as_str()?.to_string();
		let request_id = payload.get("request_id").and_then(Value::as_u64);
		let extra = payload
			.as_object()
			.map(|obj| {
				obj.iter()
					.filter(|(k, _)| k.as_str() != "mensaje" && k.as_str() != "request_id")
					.map(|(k, v)| (k.clone(), v.clone()))
					.collect()
			})
			.unwrap_or_default();

		Some(Self {
			mensaje,
			request_id,
			extra,
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn topic_joins_role_and_identity() {
		assert_eq!(topic_for("customer", "luciano"), "customer:luciano");
		assert_eq!(topic_for("driver", "alekong"), "driver:alekong");
	}

	#[test]
	fn booking_body_omits_request_id_by_default() {
		let body = BookingBody {
			pickup_address: "Tecnologico de Monterrey, campus Puebla, Mexico".into(),
			dropoff_address: "Triangulo Las Animas, Puebla, Mexico".into(),
			username: "luciano".into(),
			request_id: None,
		};
		let value = serde_json::to_value(&body).unwrap();
		assert_eq!(
			value,
			json!({
				"pickup_address": "Tecnologico de Monterrey, campus Puebla, Mexico",
				"dropoff_address": "Triangulo Las Animas, Puebla, Mexico",
				"username": "luciano",
			})
		);
	}

	#[test]
	fn status_message_keeps_extra_fields() {
		let msg = StatusMessage::from_payload(&json!({"mensaje": "Driver assigned", "driver": "alekong"})).unwrap();
		assert_eq!(msg.mensaje, "Driver assigned");
		assert_eq!(msg.request_id, None);
		assert_eq!(msg.extra["driver"], "alekong");
	}

	#[test]
	fn status_message_requires_string_mensaje() {
		assert!(StatusMessage::from_payload(&json!({})).is_none());
		assert!(StatusMessage::from_payload(&json!({"mensaje": 42})).is_none());
		assert!(StatusMessage::from_payload(&json!("Driver assigned")).is_none());
	}

	#[test]
	fn status_message_reads_numeric_request_id() {
		let msg = StatusMessage::from_payload(&json!({"mensaje": "ok", "request_id": 7})).unwrap();
		assert_eq!(msg.request_id, Some(7));
	}
}
