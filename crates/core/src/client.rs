//! Customer-facing booking client.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taxi_protocol::events::{BOOKING_REQUEST, GREETINGS};
use taxi_runtime::{Connection, TransportParts, WebSocketTransport};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::dispatcher::BookingDispatcher;
use crate::error::{ConnectionError, Error, Result};
use crate::identity::Identity;
use crate::manager::{ChannelSessionManager, ManagerStats};
use crate::outcome::{OutcomeReader, StatusUpdate};
use crate::session::ChannelSession;

/// Wraps `parts` in a [`Connection`] and runs it on a background task.
pub fn spawn_connection(parts: TransportParts, heartbeat: Option<Duration>) -> Arc<Connection> {
	start_connection(parts, heartbeat).0
}

fn start_connection(parts: TransportParts, heartbeat: Option<Duration>) -> (Arc<Connection>, JoinHandle<()>) {
	let mut connection = Connection::new(parts);
	if let Some(interval) = heartbeat {
		connection = connection.with_heartbeat(interval);
	}
	let connection = Arc::new(connection);

	let conn_for_loop = Arc::clone(&connection);
	let driver = tokio::spawn(async move {
		conn_for_loop.run().await;
	});
	(connection, driver)
}

/// Channel session plus booking dispatcher for one customer at a time.
///
/// Setting an identity (re)opens the customer channel and wires its
/// `booking_request` pushes into the dispatcher's outcome slot.
///
/// A client built by [`connect`](Self::connect) or
/// [`from_transport`](Self::from_transport) owns its socket: dropping it (or
/// calling [`shutdown`](Self::shutdown)) leaves the channel and closes the
/// connection. A client built with [`new`](Self::new) leaves the shared
/// connection open.
pub struct CustomerClient {
	manager: ChannelSessionManager,
	dispatcher: BookingDispatcher,
	token: String,
	identity: Mutex<Option<Identity>>,
	/// Dispatch loop of the connection this client opened itself
	driver: Option<JoinHandle<()>>,
}

impl CustomerClient {
	/// Opens the socket described by `config` and builds a client that owns it.
	pub async fn connect(config: &ClientConfig) -> Result<Self> {
		config.validate()?;
		let ws_url = config.websocket_url()?;
		tracing::debug!(%ws_url, "Connecting to channel socket");
		let (transport, message_rx) = WebSocketTransport::connect(&ws_url).await?;
		Self::from_transport(transport.into_transport_parts(message_rx), config)
	}

	/// Starts a connection over `parts` and builds a client that owns it.
	pub fn from_transport(parts: TransportParts, config: &ClientConfig) -> Result<Self> {
		config.validate()?;
		let (connection, driver) = start_connection(parts, config.heartbeat_interval());
		match Self::new(Arc::clone(&connection), config) {
			Ok(mut client) => {
				client.driver = Some(driver);
				Ok(client)
			}
			Err(e) => {
				connection.close();
				Err(e)
			}
		}
	}

	/// Builds a client on an existing connection.
	pub fn new(connection: Arc<Connection>, config: &ClientConfig) -> Result<Self> {
		Ok(Self {
			manager: ChannelSessionManager::new(connection, config.topic_prefix.clone(), config.join_timeout()),
			dispatcher: BookingDispatcher::new(config)?,
			token: config.auth_token.clone(),
			identity: Mutex::new(None),
			driver: None,
		})
	}

	/// Switches to `name`, opening its channel.
	///
	/// Calling it again with the same name while the session is live keeps
	/// the existing session.
	pub fn set_identity(&self, name: &str) -> Result<ChannelSession> {
		let identity = Identity::new(name)?;
		let session = self.manager.open(&identity, &self.token);

		session
			.on(GREETINGS, |payload| {
				tracing::info!(%payload, "Greetings from server");
			})
			.detach();

		let dispatcher = self.dispatcher.clone();
		session
			.on(BOOKING_REQUEST, move |payload| {
				dispatcher.publish_push(&payload);
			})
			.detach();

		*self.identity.lock() = Some(identity);
		Ok(session)
	}

	pub fn identity(&self) -> Option<Identity> {
		self.identity.lock().clone()
	}

	/// Submits a booking for the current identity.
	pub async fn submit(&self, pickup_address: &str, dropoff_address: &str) -> Result<StatusUpdate> {
		let identity = self.identity().ok_or(Error::NoSession)?;
		self.dispatcher.submit(pickup_address, dropoff_address, &identity).await
	}

	pub fn session(&self) -> Option<ChannelSession> {
		self.manager.current()
	}

	pub fn outcomes(&self) -> OutcomeReader {
		self.dispatcher.outcomes()
	}

	pub fn errors(&self) -> broadcast::Receiver<ConnectionError> {
		self.manager.errors()
	}

	pub fn stats(&self) -> ManagerStats {
		self.manager.stats()
	}

	pub fn manager(&self) -> &ChannelSessionManager {
		&self.manager
	}

	pub fn dispatcher(&self) -> &BookingDispatcher {
		&self.dispatcher
	}

	/// Closes the channel and forgets the identity.
	///
	/// The socket stays open, so [`set_identity`](Self::set_identity) can
	/// join again.
	pub fn close(&self) -> bool {
		self.identity.lock().take();
		self.manager.close()
	}

	/// Returns true when dropping this client closes its connection.
	pub fn owns_connection(&self) -> bool {
		self.driver.is_some()
	}

	/// Leaves the channel, closes an owned connection and waits for its
	/// dispatch loop to flush and exit.
	pub async fn shutdown(mut self) {
		self.close();
		if let Some(driver) = self.driver.take() {
			self.manager.connection().close();
			if let Err(e) = driver.await {
				tracing::warn!("Connection task ended abnormally: {}", e);
			}
		}
	}
}

impl Drop for CustomerClient {
	fn drop(&mut self) {
		self.manager.close();
		if self.driver.take().is_some() {
			self.manager.connection().close();
		}
	}
}
