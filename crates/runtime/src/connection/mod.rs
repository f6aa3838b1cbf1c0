//! Channel socket connection.
//!
//! This module implements the request/reply correlation layer on top of the
//! transport. It handles:
//! - Generating unique message refs
//! - Correlating `phx_reply` frames with pending requests
//! - Routing server pushes to the [`TopicRoute`] registered for their topic
//! - Sending heartbeats and detecting a dead socket
//! - Closing the socket on request ([`Connection::close`])
//!
//! # Message Flow
//!
//! 1. A session calls [`Connection::join`] or [`Connection::request`]
//! 2. Connection allocates a ref and parks a oneshot sender under it
//! 3. The frame is queued for the writer task
//! 4. The caller awaits the oneshot receiver
//! 5. The dispatch loop receives the matching `phx_reply`
//! 6. The reply is resolved to `Ok(response)` or [`Error::Rejected`]


mod routes;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use taxi_protocol::events::{self, PHOENIX_TOPIC};
use taxi_protocol::{Frame, ReplyPayload, ReplyStatus};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::sync::Mutex as TokioMutex;

pub use routes::{RouteTable, TopicRoute};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// How long the writer gets to flush queued frames once the loop stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// A request waiting for its `phx_reply`.
struct PendingRequest {
	event: String,
	tx: oneshot::Sender<Result<Value>>,
}

/// Pending request callbacks keyed by message ref.
type CallbackMap = Arc<Mutex<HashMap<String, PendingRequest>>>;

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	msg_ref: String,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(msg_ref: String, callbacks: CallbackMap) -> Self {
		Self {
			msg_ref,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.msg_ref).is_some() {
			tracing::debug!(msg_ref = %self.msg_ref, "CancelGuard: removed orphaned callback");
		}
	}
}

/// Reply to a queued request.
///
/// Dropping it before the reply arrives removes the pending callback, so a
/// late reply is ignored.
pub struct PendingReply {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for PendingReply {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Connection to a channel server.
///
/// One connection multiplexes any number of topics. Sessions register a
/// [`TopicRoute`] per topic and receive that topic's pushes through it.
pub struct Connection {
	/// Sequential ref counter
	last_ref: AtomicU64,
	/// Pending request callbacks keyed by ref
	callbacks: CallbackMap,
	/// Channel for sending outbound frames to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport sender (taken by run() to start writer task)
	transport_sender: TokioMutex<Option<Box<dyn Transport>>>,
	/// Receiver half of transport (owned by run loop, only needed once)
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	/// Receiver for incoming messages from transport
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Receiver for outbound frames (taken by run() to start writer task)
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Topic routes
	routes: RouteTable,
	/// Ref of the heartbeat still waiting for its reply
	pending_heartbeat: Mutex<Option<String>>,
	heartbeat_interval: Option<Duration>,
	closed: AtomicBool,
	/// Wakes the dispatch loop when [`Connection::close`] is called
	stop: Notify,
}

impl Connection {
	/// Creates a new Connection with the given transport.
	///
	/// Heartbeats are off until [`with_heartbeat`](Self::with_heartbeat) is used.
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_ref: AtomicU64::new(1),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			routes: RouteTable::new(),
			pending_heartbeat: Mutex::new(None),
			heartbeat_interval: None,
			closed: AtomicBool::new(false),
			stop: Notify::new(),
		}
	}

	/// Sends a heartbeat every `interval`; a heartbeat still unanswered at the
	/// next tick closes the connection.
	pub fn with_heartbeat(mut self, interval: Duration) -> Self {
		self.heartbeat_interval = Some(interval).filter(|d| !d.is_zero());
		self
	}

	/// Allocates a fresh message ref.
	pub fn make_ref(&self) -> String {
		self.last_ref.fetch_add(1, Ordering::SeqCst).to_string()
	}

	/// Returns true once the dispatch loop has stopped.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Closes the connection from the client side.
	///
	/// Pending requests fail with [`Error::ChannelClosed`] and routes are told
	/// about the disconnect. The dispatch loop then flushes frames already
	/// queued (a `phx_leave`, say), closes the transport and returns.
	/// Idempotent.
	pub fn close(&self) {
		self.shutdown("closed by client");
		self.stop.notify_one();
	}

	/// Returns the routing table.
	pub fn routes(&self) -> &RouteTable {
		&self.routes
	}

	/// Registers `route` as the receiver of `topic` pushes for `join_ref`.
	pub fn register_route(&self, topic: &str, join_ref: &str, route: Arc<dyn TopicRoute>) {
		if let Some(previous) = self.routes.insert(topic, join_ref, route) {
			tracing::warn!(topic, %previous, join_ref, "Replaced existing route for topic");
		}
	}

	/// Removes the route for `topic` if `join_ref` still owns it.
	pub fn unregister_route(&self, topic: &str, join_ref: &str) -> bool {
		self.routes.remove(topic, join_ref)
	}

	/// Sends `phx_join` for `topic` using `join_ref` as the request ref and
	/// awaits the reply.
	pub async fn join(&self, topic: &str, join_ref: &str, payload: Value) -> Result<Value> {
		self.start_join(topic, join_ref, payload)?.await
	}

	/// Queues `phx_join` right away and returns the pending reply.
	///
	/// Unlike [`join`](Self::join), the frame is on the wire queue before this
	/// returns, whether or not the reply is ever awaited.
	pub fn start_join(&self, topic: &str, join_ref: &str, payload: Value) -> Result<PendingReply> {
		let frame = Frame::request(Some(join_ref.to_string()), join_ref.to_string(), topic, events::PHX_JOIN, payload);
		self.start_request(frame)
	}

	/// Sends a request on `topic` and awaits its reply.
	pub async fn request(&self, topic: &str, event: &str, payload: Value, join_ref: Option<&str>) -> Result<Value> {
		let frame = Frame::request(join_ref.map(str::to_string), self.make_ref(), topic, event, payload);
		self.start_request(frame)?.await
	}

	/// Sends a request without waiting for (or tracking) its reply.
	pub fn push(&self, topic: &str, event: &str, payload: Value, join_ref: Option<&str>) -> Result<()> {
		let frame = Frame::request(join_ref.map(str::to_string), self.make_ref(), topic, event, payload);
		self.enqueue(&frame)
	}

	fn start_request(&self, frame: Frame) -> Result<PendingReply> {
		let msg_ref = frame.msg_ref.clone().ok_or_else(|| Error::ProtocolError("request frame without ref".to_string()))?;

		tracing::debug!(topic = %frame.topic, event = %frame.event, %msg_ref, "Sending request");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(
			msg_ref.clone(),
			PendingRequest {
				event: frame.event.clone(),
				tx,
			},
		);
		let guard = CancelGuard::new(msg_ref, Arc::clone(&self.callbacks));

		self.enqueue(&frame)?;

		Ok(PendingReply { rx, guard })
	}

	fn enqueue(&self, frame: &Frame) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}
		let value = serde_json::to_value(frame)?;
		if self.outbound_tx.send(value).is_err() {
			tracing::error!("Failed to queue frame: outbound channel closed");
			return Err(Error::ChannelClosed);
		}
		Ok(())
	}

	/// Runs the dispatch loop until the transport closes or
	/// [`close`](Self::close) is called.
	///
	/// On exit every pending request fails with [`Error::ChannelClosed`] and
	/// every registered route is told about the disconnect.
	pub async fn run(self: &Arc<Self>) {
		let (Some(transport_receiver), Some(mut transport_sender), Some(mut outbound_rx), Some(mut message_rx)) = (
			self.transport_receiver.lock().await.take(),
			self.transport_sender.lock().await.take(),
			self.outbound_rx.lock().await.take(),
			self.message_rx.lock().await.take(),
		) else {
			tracing::error!("Connection::run called more than once");
			return;
		};

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!("Transport read error: {}", e);
			}
		});

		let (flush_tx, mut flush_rx) = oneshot::channel::<()>();
		let mut writer_handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					biased;
					message = outbound_rx.recv() => {
						let Some(message) = message else { break };
						if let Err(e) = transport_sender.send(message).await {
							tracing::error!("Transport write error: {}", e);
							return;
						}
					}
					_ = &mut flush_rx => {
						while let Ok(message) = outbound_rx.try_recv() {
							if let Err(e) = transport_sender.send(message).await {
								tracing::error!("Transport write error: {}", e);
								return;
							}
						}
						break;
					}
				}
			}
			if let Err(e) = transport_sender.close().await {
				tracing::debug!("Transport close error: {}", e);
			}
		});

		let mut heartbeat = self.heartbeat_interval.map(|period| {
			let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			ticker
		});

		let reason = loop {
			tokio::select! {
				_ = self.stop.notified() => {
					break "closed by client";
				}
				message = message_rx.recv() => {
					let Some(value) = message else {
						break "socket closed";
					};
					match serde_json::from_value::<Frame>(value) {
						Ok(frame) => self.dispatch_internal(frame),
						Err(e) => tracing::error!("Failed to parse frame: {}", e),
					}
				}
				_ = async {
					match heartbeat.as_mut() {
						Some(ticker) => { ticker.tick().await; }
						None => std::future::pending::<()>().await,
					}
				} => {
					if !self.send_heartbeat() {
						break "heartbeat timeout";
					}
				}
			}
		};

		self.shutdown(reason);
		let _ = flush_tx.send(());
		if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
			tracing::warn!("Writer did not flush in time");
			writer_handle.abort();
		}
		reader_handle.abort();
	}

	/// Returns false when the previous heartbeat was never answered.
	fn send_heartbeat(&self) -> bool {
		let mut pending = self.pending_heartbeat.lock();
		if let Some(stale) = pending.as_deref() {
			tracing::warn!(msg_ref = stale, "Heartbeat not acknowledged, closing connection");
			return false;
		}

		let msg_ref = self.make_ref();
		let frame = Frame::request(None, msg_ref.clone(), PHOENIX_TOPIC, events::HEARTBEAT, serde_json::json!({}));
		match self.enqueue(&frame) {
			Ok(()) => {
				tracing::trace!(%msg_ref, "Heartbeat sent");
				*pending = Some(msg_ref);
				true
			}
			Err(_) => false,
		}
	}

	fn shutdown(&self, reason: &str) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		tracing::debug!(reason, "Connection closed");

		let pending: Vec<_> = self.callbacks.lock().drain().map(|(_, request)| request).collect();
		for request in pending {
			let _ = request.tx.send(Err(Error::ChannelClosed));
		}

		for route in self.routes.all() {
			route.on_disconnect(reason);
		}
	}

	/// Dispatches an incoming frame (test-only public version).
	#[cfg(test)]
	pub fn dispatch(&self, frame: Frame) {
		self.dispatch_internal(frame)
	}

	fn dispatch_internal(&self, frame: Frame) {
		tracing::debug!(topic = %frame.topic, event = %frame.event, msg_ref = ?frame.msg_ref, "Dispatching frame");

		if frame.is_reply() {
			self.dispatch_reply(frame);
			return;
		}

		if frame.topic == PHOENIX_TOPIC || events::is_control_event(&frame.event) {
			tracing::debug!(topic = %frame.topic, event = %frame.event, "Socket-level frame ignored");
			return;
		}

		match self.routes.resolve(&frame.topic, frame.join_ref.as_deref()) {
			Some(route) => route.on_event(&frame.event, frame.payload),
			None => tracing::debug!(topic = %frame.topic, event = %frame.event, "Event for unknown topic (ignored)"),
		}
	}

	fn dispatch_reply(&self, frame: Frame) {
		let Some(msg_ref) = frame.msg_ref.as_deref() else {
			tracing::debug!(topic = %frame.topic, "Reply without ref (ignored)");
			return;
		};

		{
			let mut pending = self.pending_heartbeat.lock();
			if pending.as_deref() == Some(msg_ref) {
				*pending = None;
				return;
			}
		}

		let Some(request) = self.callbacks.lock().remove(msg_ref) else {
			tracing::debug!(topic = %frame.topic, msg_ref, "Reply for unknown ref (ignored)");
			return;
		};

		let result = parse_reply(&frame, &request.event);
		let _ = request.tx.send(result);
	}
}

/// Converts a `phx_reply` frame into the request's result.
fn parse_reply(frame: &Frame, event: &str) -> Result<Value> {
	let reply: ReplyPayload = serde_json::from_value(frame.payload.clone())
		.map_err(|e| Error::ProtocolError(format!("malformed phx_reply on '{}': {e}", frame.topic)))?;

	match reply.status {
		ReplyStatus::Ok => Ok(reply.response),
		ReplyStatus::Error => Err(Error::Rejected {
			topic: frame.topic.clone(),
			event: event.to_string(),
			response: reply.response,
		}),
		ReplyStatus::Other => Err(Error::ProtocolError(format!(
			"unexpected {event} reply status on '{}': {}",
			frame.topic, frame.payload
		))),
	}
}
