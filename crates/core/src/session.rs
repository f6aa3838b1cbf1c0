//! One customer channel on the shared socket.
//!
//! A [`ChannelSession`] owns the route for its topic, the join in flight,
//! and the event handlers registered on it. Releasing the session undoes all
//! three and happens exactly once, whether through [`ChannelSession::close`],
//! a join failure, a server-side close, or the last handle being dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use taxi_protocol::JoinPayload;
use taxi_protocol::events::{PHX_CLOSE, PHX_ERROR, PHX_LEAVE};
use taxi_runtime::{Connection, TopicRoute};
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;

use crate::error::{ConnectionError, ConnectionErrorKind, Result};
use crate::handlers::{EventHandlers, Subscription};
use crate::identity::Identity;

/// Lifecycle of a channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
	Unjoined,
	Joining,
	Joined,
	/// Closed by the client, rejected, or dropped by the server.
	Closed,
}

impl SessionStatus {
	/// True while the session can still deliver events.
	pub fn is_live(self) -> bool {
		matches!(self, SessionStatus::Joining | SessionStatus::Joined)
	}
}

/// Counters shared by every session a manager opens.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
	pub opened: AtomicU64,
	pub joins_sent: AtomicU64,
	pub released: AtomicU64,
}

/// Everything needed to open a session.
pub(crate) struct SessionParams {
	pub connection: Arc<Connection>,
	pub identity: Identity,
	pub role: String,
	pub token: String,
	pub join_timeout: Duration,
	pub errors: broadcast::Sender<ConnectionError>,
	pub counters: Arc<SessionCounters>,
}

struct SessionInner {
	identity: Identity,
	topic: String,
	join_ref: String,
	connection: Arc<Connection>,
	handlers: EventHandlers,
	status: watch::Sender<SessionStatus>,
	released: AtomicBool,
	join_sent: AtomicBool,
	join_task: Mutex<Option<AbortHandle>>,
	last_error: Mutex<Option<ConnectionError>>,
	errors: broadcast::Sender<ConnectionError>,
	counters: Arc<SessionCounters>,
}

/// Handle to a channel session. Clones share the same session.
#[derive(Clone)]
pub struct ChannelSession {
	inner: Arc<SessionInner>,
}

impl ChannelSession {
	/// Registers the topic route and queues the join.
	///
	/// Must be called inside a Tokio runtime; the join reply is awaited on a
	/// spawned task.
	pub(crate) fn open(params: SessionParams) -> Self {
		let SessionParams {
			connection,
			identity,
			role,
			token,
			join_timeout,
			errors,
			counters,
		} = params;

		let topic = identity.topic(&role);
		let join_ref = connection.make_ref();
		let (status, _) = watch::channel(SessionStatus::Unjoined);
		counters.opened.fetch_add(1, Ordering::SeqCst);

		let inner = Arc::new(SessionInner {
			identity,
			topic,
			join_ref,
			connection,
			handlers: EventHandlers::new(),
			status,
			released: AtomicBool::new(false),
			join_sent: AtomicBool::new(false),
			join_task: Mutex::new(None),
			last_error: Mutex::new(None),
			errors,
			counters,
		});
		SessionInner::start_join(&inner, &token, join_timeout);

		Self { inner }
	}

	pub fn identity(&self) -> &Identity {
		&self.inner.identity
	}

	pub fn topic(&self) -> &str {
		&self.inner.topic
	}

	pub fn join_ref(&self) -> &str {
		&self.inner.join_ref
	}

	pub fn status(&self) -> SessionStatus {
		*self.inner.status.borrow()
	}

	pub fn status_changes(&self) -> watch::Receiver<SessionStatus> {
		self.inner.status.subscribe()
	}

	/// Waits until the join settles.
	///
	/// Returns the error that closed the session, or a `ChannelClosed` error
	/// when it was closed locally before joining.
	pub async fn joined(&self) -> Result<()> {
		let mut rx = self.inner.status.subscribe();
		let status = match rx.wait_for(|s| matches!(s, SessionStatus::Joined | SessionStatus::Closed)).await {
			Ok(status) => *status,
			Err(_) => SessionStatus::Closed,
		};

		if status == SessionStatus::Joined {
			return Ok(());
		}
		let err = self.last_error().unwrap_or_else(|| {
			ConnectionError::new(
				self.inner.identity.as_str(),
				&self.inner.topic,
				ConnectionErrorKind::ChannelClosed,
				"session closed before join completed",
			)
		});
		Err(err.into())
	}

	/// Registers the handler for `event`, replacing any earlier one.
	///
	/// Works before the join completes. Handlers of a released session are
	/// never called.
	pub fn on<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(Value) + Send + Sync + 'static,
	{
		if self.is_released() {
			tracing::debug!(topic = %self.inner.topic, event, "Handler registered on released session (ignored)");
			return Subscription::inert(event);
		}
		self.inner.handlers.set(event, handler)
	}

	/// Releases the session. Returns false if it was already released.
	pub fn close(&self) -> bool {
		self.inner.release(true)
	}

	pub fn is_released(&self) -> bool {
		self.inner.released.load(Ordering::SeqCst)
	}

	/// The failure that closed this session, if any.
	pub fn last_error(&self) -> Option<ConnectionError> {
		self.inner.last_error.lock().clone()
	}

	/// Number of handlers currently registered.
	pub fn handler_count(&self) -> usize {
		self.inner.handlers.len()
	}

	pub(crate) fn same_session(&self, other: &ChannelSession) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl std::fmt::Debug for ChannelSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelSession")
			.field("topic", &self.inner.topic)
			.field("join_ref", &self.inner.join_ref)
			.field("status", &self.status())
			.finish()
	}
}

impl SessionInner {
	fn start_join(self: &Arc<Self>, token: &str, join_timeout: Duration) {
		let route: Arc<dyn TopicRoute> = Arc::new(SessionRoute(Arc::downgrade(self)));
		self.connection.register_route(&self.topic, &self.join_ref, route);
		self.status.send_replace(SessionStatus::Joining);

		let payload = match serde_json::to_value(JoinPayload {
			token: token.to_string(),
		}) {
			Ok(payload) => payload,
			Err(e) => {
				self.fail(ConnectionErrorKind::JoinFailed, e.to_string());
				return;
			}
		};

		let reply = match self.connection.start_join(&self.topic, &self.join_ref, payload) {
			Ok(reply) => reply,
			Err(e) => {
				self.fail_with(ConnectionError::from_join(self.identity.as_str(), &self.topic, &e));
				return;
			}
		};
		self.join_sent.store(true, Ordering::SeqCst);
		self.counters.joins_sent.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(topic = %self.topic, join_ref = %self.join_ref, "Join sent");

		let weak = Arc::downgrade(self);
		let topic = self.topic.clone();
		let task = tokio::spawn(async move {
			let result = match tokio::time::timeout(join_timeout, reply).await {
				Ok(result) => result,
				Err(_) => Err(taxi_runtime::Error::Timeout(format!("join '{topic}' after {join_timeout:?}"))),
			};
			if let Some(inner) = weak.upgrade() {
				inner.finish_join(result);
			}
		});
		*self.join_task.lock() = Some(task.abort_handle());
	}

	fn finish_join(&self, result: taxi_runtime::Result<Value>) {
		self.join_task.lock().take();
		if self.released.load(Ordering::SeqCst) {
			tracing::debug!(topic = %self.topic, "Join settled after release (ignored)");
			return;
		}

		match result {
			Ok(_) => {
				self.status.send_if_modified(|status| {
					if *status == SessionStatus::Joining {
						*status = SessionStatus::Joined;
						true
					} else {
						false
					}
				});
				tracing::info!(topic = %self.topic, "Joined channel");
			}
			Err(e) => self.fail_with(ConnectionError::from_join(self.identity.as_str(), &self.topic, &e)),
		}
	}

	fn fail(&self, kind: ConnectionErrorKind, message: impl Into<String>) {
		self.fail_with(ConnectionError::new(self.identity.as_str(), &self.topic, kind, message));
	}

	/// Records `err`, broadcasts it, and releases the session.
	///
	/// Does nothing if the session was already released, so a local close
	/// racing a failure never reports an error. Only a timed-out join gets a
	/// leave; in every other case the server has already dropped the channel.
	fn fail_with(&self, err: ConnectionError) {
		if !self.claim_release() {
			return;
		}
		tracing::warn!(topic = %self.topic, kind = %err.kind, message = %err.message, "Channel session failed");
		let send_leave = err.kind == ConnectionErrorKind::JoinTimeout;
		*self.last_error.lock() = Some(err.clone());
		let _ = self.errors.send(err);
		self.teardown(send_leave);
	}

	/// Tears the session down. Only the first call has any effect.
	fn release(&self, send_leave: bool) -> bool {
		if !self.claim_release() {
			return false;
		}
		self.teardown(send_leave);
		true
	}

	/// Marks the session released. Returns true for the one caller that
	/// must run [`teardown`](Self::teardown).
	fn claim_release(&self) -> bool {
		!self.released.swap(true, Ordering::SeqCst)
	}

	fn teardown(&self, send_leave: bool) {
		if let Some(task) = self.join_task.lock().take() {
			task.abort();
		}
		self.connection.unregister_route(&self.topic, &self.join_ref);

		if send_leave && self.join_sent.load(Ordering::SeqCst) && !self.connection.is_closed() {
			if let Err(e) = self.connection.push(&self.topic, PHX_LEAVE, json!({}), Some(&self.join_ref)) {
				tracing::debug!(topic = %self.topic, error = %e, "Could not send leave");
			}
		}

		self.handlers.clear();
		self.status.send_replace(SessionStatus::Closed);
		self.counters.released.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(topic = %self.topic, join_ref = %self.join_ref, "Channel session released");
	}

	fn handle_event(&self, event: &str, payload: Value) {
		if self.released.load(Ordering::SeqCst) {
			return;
		}
		match event {
			PHX_ERROR => self.fail(ConnectionErrorKind::ChannelCrashed, payload.to_string()),
			PHX_CLOSE => self.fail(ConnectionErrorKind::ChannelClosed, "server closed the channel"),
			_ => {
				if !self.handlers.dispatch(event, payload) {
					tracing::debug!(topic = %self.topic, event, "No handler for event");
				}
			}
		}
	}
}

impl Drop for SessionInner {
	fn drop(&mut self) {
		self.release(true);
	}
}

/// Route registered on the connection; holds the session weakly so the
/// connection never keeps a dropped session alive.
struct SessionRoute(Weak<SessionInner>);

impl TopicRoute for SessionRoute {
	fn on_event(&self, event: &str, payload: Value) {
		if let Some(inner) = self.0.upgrade() {
			inner.handle_event(event, payload);
		}
	}

	fn on_disconnect(&self, reason: &str) {
		if let Some(inner) = self.0.upgrade() {
			inner.fail(ConnectionErrorKind::Disconnected, reason);
		}
	}
}

#[cfg(test)]
mod tests;
