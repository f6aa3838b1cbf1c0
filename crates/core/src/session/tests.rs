use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::{Value, json};
use taxi_runtime::{Connection, MemoryServer, MemoryTransport};
use tokio::sync::broadcast;

use super::*;

struct Harness {
	connection: Arc<Connection>,
	server: MemoryServer,
	errors: broadcast::Sender<ConnectionError>,
	counters: Arc<SessionCounters>,
}

impl Harness {
	fn new() -> Self {
		let (parts, server) = MemoryTransport::pair();
		let connection = Arc::new(Connection::new(parts));
		let conn = Arc::clone(&connection);
		tokio::spawn(async move { conn.run().await });
		let (errors, _) = broadcast::channel(16);
		Self {
			connection,
			server,
			errors,
			counters: Arc::default(),
		}
	}

	fn open(&self, name: &str) -> ChannelSession {
		self.open_with_timeout(name, Duration::from_secs(10))
	}

	fn open_with_timeout(&self, name: &str, join_timeout: Duration) -> ChannelSession {
		ChannelSession::open(SessionParams {
			connection: Arc::clone(&self.connection),
			identity: Identity::new(name).unwrap(),
			role: "customer".into(),
			token: "123".into(),
			join_timeout,
			errors: self.errors.clone(),
			counters: Arc::clone(&self.counters),
		})
	}
}

#[tokio::test]
async fn join_sends_token_and_becomes_joined() {
	let mut h = Harness::new();
	let session = h.open("luciano");
	assert_eq!(session.status(), SessionStatus::Joining);
	assert_eq!(session.topic(), "customer:luciano");

	let join = h.server.recv_event("phx_join").await.unwrap();
	assert_eq!(join.topic, "customer:luciano");
	assert_eq!(join.payload, json!({"token": "123"}));
	assert_eq!(join.join_ref.as_deref(), Some(session.join_ref()));

	h.server.reply_ok(&join, json!({}));
	session.joined().await.unwrap();
	assert_eq!(session.status(), SessionStatus::Joined);
	assert_eq!(h.counters.joins_sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_join_closes_and_reports() {
	let mut h = Harness::new();
	let mut errors = h.errors.subscribe();
	let session = h.open("luciano");

	let join = h.server.recv_event("phx_join").await.unwrap();
	h.server.reply_error(&join, json!({"reason": "unauthorized"}));

	let err = session.joined().await.unwrap_err();
	assert!(err.is_connection());
	assert_eq!(session.status(), SessionStatus::Closed);

	let reported = errors.recv().await.unwrap();
	assert_eq!(reported.kind, ConnectionErrorKind::JoinRejected);
	assert_eq!(reported.message, "unauthorized");
	assert_eq!(session.last_error(), Some(reported));

	// Rejected joins are not followed by a leave.
	tokio::task::yield_now().await;
	assert!(h.server.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn join_timeout_closes_and_leaves() {
	let mut h = Harness::new();
	let session = h.open_with_timeout("luciano", Duration::from_secs(5));
	h.server.recv_event("phx_join").await.unwrap();

	let err = session.joined().await.unwrap_err();
	let crate::Error::Connection(conn) = err else {
		panic!("expected connection error, got {err:?}");
	};
	assert_eq!(conn.kind, ConnectionErrorKind::JoinTimeout);

	let leave = h.server.recv().await.unwrap();
	assert_eq!(leave.event, "phx_leave");
	assert_eq!(leave.join_ref.as_deref(), Some(session.join_ref()));
}

#[tokio::test]
async fn close_releases_exactly_once() {
	let mut h = Harness::new();
	let session = h.open("luciano");
	let join = h.server.recv_event("phx_join").await.unwrap();
	h.server.reply_ok(&join, json!({}));
	session.joined().await.unwrap();

	assert!(session.close());
	assert!(!session.close());
	drop(session);

	let leave = h.server.recv().await.unwrap();
	assert_eq!(leave.event, "phx_leave");
	assert_eq!(leave.topic, "customer:luciano");
	tokio::task::yield_now().await;
	assert!(h.server.try_recv().is_none());
	assert_eq!(h.counters.released.load(Ordering::SeqCst), 1);
	assert!(h.connection.routes().is_empty());
}

#[tokio::test]
async fn close_during_pending_join_ignores_late_reply() {
	let mut h = Harness::new();
	let session = h.open("alice");
	let join = h.server.recv_event("phx_join").await.unwrap();

	session.close();
	assert_eq!(session.status(), SessionStatus::Closed);
	h.server.recv_event("phx_leave").await.unwrap();

	h.server.reply_ok(&join, json!({}));
	tokio::task::yield_now().await;
	assert_eq!(session.status(), SessionStatus::Closed);
	assert!(session.last_error().is_none());
	assert!(session.joined().await.is_err());
}

#[tokio::test]
async fn handler_registered_before_join_fires() {
	let mut h = Harness::new();
	let session = h.open("luciano");
	let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
	session
		.on("booking_request", move |payload| {
			let _ = tx.send(payload);
		})
		.detach();

	let join = h.server.recv_event("phx_join").await.unwrap();
	h.server.reply_ok(&join, json!({}));
	session.joined().await.unwrap();

	h.server.push("customer:luciano", "booking_request", json!({"mensaje": "Driver arriving"}));
	let payload = rx.recv().await.unwrap();
	assert_eq!(payload["mensaje"], "Driver arriving");
}

#[tokio::test]
async fn released_session_ignores_handlers() {
	let h = Harness::new();
	let session = h.open("luciano");
	session.close();

	let sub = session.on("booking_request", |_| panic!("must not run"));
	assert_eq!(session.handler_count(), 0);
	drop(sub);
}

#[tokio::test]
async fn server_error_closes_session() {
	let mut h = Harness::new();
	let mut errors = h.errors.subscribe();
	let session = h.open("luciano");
	let join = h.server.recv_event("phx_join").await.unwrap();
	h.server.reply_ok(&join, json!({}));
	session.joined().await.unwrap();

	h.server.push("customer:luciano", "phx_error", json!({}));
	let reported = errors.recv().await.unwrap();
	assert_eq!(reported.kind, ConnectionErrorKind::ChannelCrashed);
	assert_eq!(session.status(), SessionStatus::Closed);
}

#[tokio::test]
async fn socket_loss_closes_session() {
	let mut h = Harness::new();
	let mut errors = h.errors.subscribe();
	let session = h.open("luciano");
	let join = h.server.recv_event("phx_join").await.unwrap();
	h.server.reply_ok(&join, json!({}));
	session.joined().await.unwrap();

	drop(h.server);
	let reported = errors.recv().await.unwrap();
	assert_eq!(reported.kind, ConnectionErrorKind::Disconnected);
	assert!(session.is_released());
}

#[tokio::test]
async fn dropping_last_handle_releases() {
	let mut h = Harness::new();
	let session = h.open("luciano");
	h.server.recv_event("phx_join").await.unwrap();

	drop(session);
	h.server.recv_event("phx_leave").await.unwrap();
	assert_eq!(h.counters.released.load(Ordering::SeqCst), 1);
	assert!(h.connection.routes().is_empty());
}

#[tokio::test]
async fn failure_after_local_close_is_not_reported() {
	let mut h = Harness::new();
	let mut errors = h.errors.subscribe();
	let session = h.open("luciano");
	let join = h.server.recv_event("phx_join").await.unwrap();
	h.server.reply_ok(&join, json!({}));
	session.joined().await.unwrap();

	// close claims the release, then a crash arrives before its teardown runs
	assert!(session.inner.claim_release());
	session.inner.fail(ConnectionErrorKind::ChannelCrashed, "{}");
	session.inner.teardown(true);

	assert!(matches!(errors.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
	assert!(session.last_error().is_none());
	assert_eq!(session.status(), SessionStatus::Closed);
	assert!(!session.close());
	assert_eq!(h.counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_racing_server_error_reports_only_when_close_loses() {
	let mut h = Harness::new();
	let mut errors = h.errors.subscribe();

	for round in 0..20 {
		let session = h.open(&format!("rider{round}"));
		let join = h.server.recv_event("phx_join").await.unwrap();
		h.server.reply_ok(&join, json!({}));
		session.joined().await.unwrap();

		h.server.push(session.topic(), "phx_error", json!({}));
		let closed_locally = session.close();
		tokio::time::sleep(Duration::from_millis(10)).await;

		let mut reported = 0;
		while errors.try_recv().is_ok() {
			reported += 1;
		}
		assert_eq!(reported, usize::from(!closed_locally), "round {round}");
		assert_eq!(session.last_error().is_some(), !closed_locally, "round {round}");
	}
	assert_eq!(h.counters.released.load(Ordering::SeqCst), 20);
}
