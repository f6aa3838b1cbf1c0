//! Bidirectional message transport under the channel [`Connection`].
//!
//! A transport is split into a sending half ([`Transport`]) and a reading
//! half ([`TransportReceiver`]). The reading half is driven by
//! [`TransportReceiver::run`] and forwards every decoded JSON message into an
//! unbounded channel consumed by the connection's dispatch loop.
//!
//! Two implementations exist:
//!
//! - [`WebSocketTransport`]: text frames over `tokio-tungstenite`
//! - [`MemoryTransport`]: in-process channels, paired with a [`MemoryServer`]
//!
//! [`Connection`]: crate::Connection

#[cfg(test)]
mod tests;

mod memory;
mod websocket;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

pub use memory::{MemoryServer, MemoryTransport};
pub use websocket::{WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender};

use crate::error::Result;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Sends one JSON message.
	fn send(&mut self, message: Value) -> TransportFuture<'_>;

	/// Closes the sending side. Dropping the sender closes it too, without a
	/// goodbye to the peer.
	fn close(&mut self) -> TransportFuture<'_> {
		Box::pin(async { Ok(()) })
	}
}

/// Reading half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the peer closes or an error occurs.
	///
	/// Returns `Ok(())` on a clean close or when the consumer went away.
	fn run(self: Box<Self>) -> TransportFuture<'static>;
}

/// Both halves plus the inbound message channel, ready for a [`Connection`].
///
/// [`Connection`]: crate::Connection
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}
