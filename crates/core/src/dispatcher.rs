//! Booking submission and status publishing.
//!
//! [`BookingDispatcher::submit`] posts a booking and publishes the reply's
//! `mensaje`. [`BookingDispatcher::publish_push`] does the same for
//! `booking_request` pushes. Both write the same [`OutcomeSink`]; whichever
//! lands last is what readers see.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use taxi_protocol::{BookingBody, StatusMessage};

use crate::booking::{BookingRequest, CorrelationId};
use crate::config::ClientConfig;
use crate::error::{Error, Result, SubmissionError};
use crate::identity::Identity;
use crate::outcome::{FailureNotice, OutcomeReader, OutcomeSink, OutcomeSource, StatusUpdate};

/// Sends booking requests and owns the outcome slot.
#[derive(Clone)]
pub struct BookingDispatcher {
	http: reqwest::Client,
	endpoint: String,
	sink: Arc<OutcomeSink>,
	/// Id of the most recent submission, 0 before the first one.
	latest_request: Arc<AtomicU64>,
	correlate: bool,
}

impl BookingDispatcher {
	/// Builds a dispatcher for the configured booking endpoint.
	pub fn new(config: &ClientConfig) -> Result<Self> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = config.request_timeout() {
			builder = builder.timeout(timeout);
		}
		let http = builder.build().map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
		Ok(Self::with_client(http, config.bookings_url(), config.correlate_pushes))
	}

	pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>, correlate: bool) -> Self {
		Self {
			http,
			endpoint: endpoint.into(),
			sink: Arc::new(OutcomeSink::new()),
			latest_request: Arc::new(AtomicU64::new(0)),
			correlate,
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub fn outcomes(&self) -> OutcomeReader {
		self.sink.reader()
	}

	/// Books a trip for `identity`.
	pub async fn submit(&self, pickup_address: &str, dropoff_address: &str, identity: &Identity) -> Result<StatusUpdate> {
		let request = BookingRequest::new(pickup_address, dropoff_address, identity.clone());
		self.send(&request).await
	}

	/// Posts `request` and publishes the reply.
	///
	/// A failed submission is recorded in the sink's failure slot and
	/// returned; the last status message stays as it was. No retry.
	pub async fn send(&self, request: &BookingRequest) -> Result<StatusUpdate> {
		self.latest_request.store(request.id.get(), Ordering::SeqCst);
		let body = request.to_body(self.correlate);
		tracing::debug!(endpoint = %self.endpoint, request = %request.id, username = %body.username, "Submitting booking");

		match self.post(&body).await {
			Ok(status) => {
				let update = StatusUpdate {
					message: status.mensaje,
					source: OutcomeSource::Reply,
					request_id: Some(request.id),
				};
				if self.is_superseded(request.id.get()) {
					tracing::debug!(request = %request.id, "Reply for superseded booking (not published)");
				} else {
					self.sink.publish(update.clone());
				}
				Ok(update)
			}
			Err(err) => {
				tracing::warn!(request = %request.id, error = %err, "Booking submission failed");
				if !self.is_superseded(request.id.get()) {
					self.sink.report_failure(FailureNotice {
						message: err.to_string(),
						status: err.status(),
						request_id: Some(request.id),
					});
				}
				Err(err.into())
			}
		}
	}

	async fn post(&self, body: &BookingBody) -> std::result::Result<StatusMessage, SubmissionError> {
		let response = self
			.http
			.post(&self.endpoint)
			.json(body)
			.send()
			.await
			.map_err(SubmissionError::Network)?;

		let status = response.status();
		let text = response.text().await.map_err(SubmissionError::Network)?;
		if !status.is_success() {
			return Err(SubmissionError::Status {
				status: status.as_u16(),
				body: text,
			});
		}

		let value: Value = serde_json::from_str(&text).map_err(|e| SubmissionError::Malformed(format!("invalid JSON: {e}")))?;
		StatusMessage::from_payload(&value).ok_or_else(|| SubmissionError::Malformed(format!("no string 'mensaje' in {value}")))
	}

	/// Publishes the `mensaje` of a `booking_request` push.
	///
	/// Returns false when the push carries no status message, or when
	/// correlation is on and the push belongs to an older submission.
	pub fn publish_push(&self, payload: &Value) -> bool {
		let Some(status) = StatusMessage::from_payload(payload) else {
			tracing::warn!(%payload, "booking_request push without 'mensaje' (ignored)");
			return false;
		};

		if let Some(id) = status.request_id {
			if self.is_superseded(id) {
				tracing::debug!(request_id = id, "Push for superseded booking (ignored)");
				return false;
			}
		}

		self.sink.publish(StatusUpdate {
			message: status.mensaje,
			source: OutcomeSource::Push,
			request_id: status.request_id.map(CorrelationId::from),
		});
		true
	}

	/// With correlation on, true when a newer submission replaced `id`.
	fn is_superseded(&self, id: u64) -> bool {
		self.correlate && id != self.latest_request.load(Ordering::SeqCst)
	}
}

impl std::fmt::Debug for BookingDispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BookingDispatcher")
			.field("endpoint", &self.endpoint)
			.field("correlate", &self.correlate)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn dispatcher(correlate: bool) -> BookingDispatcher {
		BookingDispatcher::with_client(reqwest::Client::new(), "http://127.0.0.1:9/api/bookings", correlate)
	}

	#[test]
	fn push_updates_sink() {
		let dispatcher = dispatcher(false);
		assert!(dispatcher.publish_push(&json!({"mensaje": "Driver arriving", "eta": 3})));

		let outcome = dispatcher.outcomes().current();
		let latest = outcome.latest.unwrap();
		assert_eq!(latest.message, "Driver arriving");
		assert_eq!(latest.source, OutcomeSource::Push);
	}

	#[test]
	fn push_without_mensaje_is_ignored() {
		let dispatcher = dispatcher(false);
		assert!(!dispatcher.publish_push(&json!({"status": "ok"})));
		assert!(!dispatcher.publish_push(&json!({"mensaje": 42})));
		assert_eq!(dispatcher.outcomes().message(), None);
	}

	#[test]
	fn correlated_push_for_old_request_is_ignored() {
		let dispatcher = dispatcher(true);
		dispatcher.latest_request.store(7, Ordering::SeqCst);

		assert!(!dispatcher.publish_push(&json!({"mensaje": "old", "request_id": 6})));
		assert!(dispatcher.publish_push(&json!({"mensaje": "current", "request_id": 7})));
		assert!(dispatcher.publish_push(&json!({"mensaje": "untagged"})));
		assert_eq!(dispatcher.outcomes().message().as_deref(), Some("untagged"));
	}

	#[test]
	fn uncorrelated_push_ignores_request_id() {
		let dispatcher = dispatcher(false);
		dispatcher.latest_request.store(7, Ordering::SeqCst);
		assert!(dispatcher.publish_push(&json!({"mensaje": "any", "request_id": 1})));
	}

	#[test]
	fn endpoint_comes_from_config() {
		let config = ClientConfig {
			base_url: "http://taxi.local:4000/".into(),
			request_timeout_ms: Some(2_000),
			..ClientConfig::default()
		};
		let dispatcher = BookingDispatcher::new(&config).unwrap();
		assert_eq!(dispatcher.endpoint(), "http://taxi.local:4000/api/bookings");
	}
}
