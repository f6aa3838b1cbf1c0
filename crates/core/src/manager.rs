//! Owner of the single customer channel.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use taxi_runtime::Connection;
use tokio::sync::broadcast;

use crate::error::{ConnectionError, Error, Result};
use crate::handlers::Subscription;
use crate::identity::Identity;
use crate::session::{ChannelSession, SessionCounters, SessionParams, SessionStatus};

const ERROR_CHANNEL_CAPACITY: usize = 32;

/// Session bookkeeping snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
	/// Sessions created.
	pub opened: u64,
	/// `phx_join` frames queued.
	pub joins_sent: u64,
	/// Sessions torn down.
	pub released: u64,
}

/// Keeps at most one [`ChannelSession`] open on a shared connection.
///
/// Opening a session for a new identity releases the previous one first, so
/// its handlers stop firing and a late join reply for it changes nothing.
pub struct ChannelSessionManager {
	connection: Arc<Connection>,
	role: String,
	join_timeout: Duration,
	current: Mutex<Option<ChannelSession>>,
	errors: broadcast::Sender<ConnectionError>,
	counters: Arc<SessionCounters>,
}

impl ChannelSessionManager {
	pub fn new(connection: Arc<Connection>, role: impl Into<String>, join_timeout: Duration) -> Self {
		let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
		Self {
			connection,
			role: role.into(),
			join_timeout,
			current: Mutex::new(None),
			errors,
			counters: Arc::default(),
		}
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	pub fn role(&self) -> &str {
		&self.role
	}

	/// Opens the channel for `identity`.
	///
	/// A live session for the same identity is returned as is, without a new
	/// join. Any other session is closed before the new one joins.
	///
	/// Must be called inside a Tokio runtime.
	pub fn open(&self, identity: &Identity, token: &str) -> ChannelSession {
		let mut current = self.current.lock();

		if let Some(session) = current.as_ref() {
			if session.identity() == identity && session.status().is_live() {
				tracing::debug!(topic = %session.topic(), "Session already open");
				return session.clone();
			}
		}

		if let Some(previous) = current.take() {
			tracing::debug!(topic = %previous.topic(), next = %identity, "Closing previous session");
			previous.close();
		}

		let session = ChannelSession::open(SessionParams {
			connection: Arc::clone(&self.connection),
			identity: identity.clone(),
			role: self.role.clone(),
			token: token.to_string(),
			join_timeout: self.join_timeout,
			errors: self.errors.clone(),
			counters: Arc::clone(&self.counters),
		});
		tracing::info!(topic = %session.topic(), "Opened channel session");
		*current = Some(session.clone());
		session
	}

	/// Registers `handler` for `event` on the current session.
	pub fn on<F>(&self, event: &str, handler: F) -> Result<Subscription>
	where
		F: Fn(Value) + Send + Sync + 'static,
	{
		let session = self.current().ok_or(Error::NoSession)?;
		Ok(session.on(event, handler))
	}

	/// Closes the current session. Returns false when there was none to close.
	pub fn close(&self) -> bool {
		let session = self.current.lock().take();
		match session {
			Some(session) => session.close(),
			None => false,
		}
	}

	/// The current session, including a failed one that has not been replaced.
	pub fn current(&self) -> Option<ChannelSession> {
		self.current.lock().clone()
	}

	pub fn status(&self) -> SessionStatus {
		self.current
			.lock()
			.as_ref()
			.map_or(SessionStatus::Unjoined, ChannelSession::status)
	}

	/// Join failures and channel drops of every session this manager opens.
	pub fn errors(&self) -> broadcast::Receiver<ConnectionError> {
		self.errors.subscribe()
	}

	pub fn stats(&self) -> ManagerStats {
		ManagerStats {
			opened: self.counters.opened.load(Ordering::SeqCst),
			joins_sent: self.counters.joins_sent.load(Ordering::SeqCst),
			released: self.counters.released.load(Ordering::SeqCst),
		}
	}

	/// True if `session` is the one this manager currently owns.
	pub fn is_current(&self, session: &ChannelSession) -> bool {
		self.current.lock().as_ref().is_some_and(|c| c.same_session(session))
	}
}

impl Drop for ChannelSessionManager {
	fn drop(&mut self) {
		if let Some(session) = self.current.get_mut().take() {
			session.close();
		}
	}
}
