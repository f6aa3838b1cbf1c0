use serde_json::json;
use taxi::{BookingOutcome, ConnectionErrorKind, CorrelationId, FailureNotice};

use super::*;

fn reply(message: &str) -> StatusUpdate {
	StatusUpdate {
		message: message.to_string(),
		source: OutcomeSource::Reply,
		request_id: Some(CorrelationId::from(3)),
	}
}

#[test]
fn json_lines_are_tagged() {
	let line = render(&OutputEvent::status(&reply("Driver assigned")), OutputFormat::Json);
	let value: serde_json::Value = serde_json::from_str(&line).unwrap();
	assert_eq!(
		value,
		json!({"kind": "status", "message": "Driver assigned", "source": "reply", "request_id": 3})
	);

	let line = render(&OutputEvent::joined("customer:luciano"), OutputFormat::Json);
	assert_eq!(line, r#"{"kind":"joined","topic":"customer:luciano"}"#);
}

#[test]
fn text_lines_are_readable() {
	colored::control::set_override(false);
	assert_eq!(render(&OutputEvent::status(&reply("Driver assigned")), OutputFormat::Text), "[reply] Driver assigned");

	let failure = OutputEvent::Failure {
		message: "boom".into(),
		status: Some(500),
	};
	assert_eq!(render(&failure, OutputFormat::Text), "failed boom (500)");
}

#[test]
fn outcome_failure_wins_over_message() {
	let outcome = BookingOutcome {
		latest: Some(reply("Driver assigned")),
		failure: Some(FailureNotice {
			message: "HTTP 500".into(),
			status: Some(500),
			request_id: None,
		}),
		version: 2,
	};
	assert!(matches!(OutputEvent::from_outcome(&outcome), Some(OutputEvent::Failure { status: Some(500), .. })));

	let empty = BookingOutcome::default();
	assert_eq!(OutputEvent::from_outcome(&empty), None);
}

#[test]
fn channel_error_includes_kind() {
	let err = ConnectionError::new("luciano", "customer:luciano", ConnectionErrorKind::JoinRejected, "unauthorized");
	assert_eq!(
		OutputEvent::channel_error(&err),
		OutputEvent::ChannelError {
			topic: "customer:luciano".into(),
			reason: "join rejected: unauthorized".into(),
		}
	);
}
