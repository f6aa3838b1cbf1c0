//! In-process transport paired with a scriptable server end.
//!
//! [`MemoryTransport::pair`] returns the client-side [`TransportParts`] and a
//! [`MemoryServer`] that sees every frame the client sends and can reply or
//! push at will. Useful for driving join/push races deterministically.

use serde_json::Value;
use taxi_protocol::{Frame, ReplyStatus};
use tokio::sync::mpsc;

use super::{Transport, TransportFuture, TransportParts, TransportReceiver};
use crate::error::Error;

/// Client end of an in-memory channel socket.
pub struct MemoryTransport {
	to_server: mpsc::UnboundedSender<Value>,
}

impl MemoryTransport {
	/// Creates a connected client/server pair.
	pub fn pair() -> (TransportParts, MemoryServer) {
		let (to_server, from_client) = mpsc::unbounded_channel();
		let (to_client, from_server) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		let parts = TransportParts {
			sender: Box::new(MemoryTransport { to_server }),
			receiver: Box::new(MemoryReceiver {
				from_server,
				message_tx,
			}),
			message_rx,
		};

		(
			parts,
			MemoryServer {
				from_client,
				to_client,
			},
		)
	}
}

impl Transport for MemoryTransport {
	fn send(&mut self, message: Value) -> TransportFuture<'_> {
		let result = self
			.to_server
			.send(message)
			.map_err(|_| Error::TransportError("memory server dropped".to_string()));
		Box::pin(async move { result })
	}
}

struct MemoryReceiver {
	from_server: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for MemoryReceiver {
	fn run(self: Box<Self>) -> TransportFuture<'static> {
		let Self {
			mut from_server,
			message_tx,
		} = *self;

		Box::pin(async move {
			while let Some(value) = from_server.recv().await {
				if message_tx.send(value).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

/// Server end of a [`MemoryTransport`].
///
/// Dropping it closes the socket from the client's point of view.
pub struct MemoryServer {
	from_client: mpsc::UnboundedReceiver<Value>,
	to_client: mpsc::UnboundedSender<Value>,
}

impl MemoryServer {
	/// Receives the next frame the client sent.
	///
	/// Returns [`None`] once the client side is gone. Messages that are not
	/// valid frames are skipped.
	pub async fn recv(&mut self) -> Option<Frame> {
		loop {
			let value = self.from_client.recv().await?;
			match serde_json::from_value(value) {
				Ok(frame) => return Some(frame),
				Err(e) => tracing::warn!(error = %e, "MemoryServer: skipping non-frame message"),
			}
		}
	}

	/// Receives frames until one with the given event arrives.
	pub async fn recv_event(&mut self, event: &str) -> Option<Frame> {
		loop {
			let frame = self.recv().await?;
			if frame.event == event {
				return Some(frame);
			}
		}
	}

	/// Returns an already-queued frame without waiting.
	pub fn try_recv(&mut self) -> Option<Frame> {
		while let Ok(value) = self.from_client.try_recv() {
			if let Ok(frame) = serde_json::from_value(value) {
				return Some(frame);
			}
		}
		None
	}

	/// Sends a raw frame to the client. Returns false if the client is gone.
	pub fn send(&self, frame: &Frame) -> bool {
		match serde_json::to_value(frame) {
			Ok(value) => self.to_client.send(value).is_ok(),
			Err(_) => false,
		}
	}

	/// Sends a raw JSON value, bypassing frame encoding.
	pub fn send_raw(&self, value: Value) -> bool {
		self.to_client.send(value).is_ok()
	}

	/// Answers `request` with `status: "ok"`.
	pub fn reply_ok(&self, request: &Frame, response: Value) -> bool {
		self.send(&request.reply(ReplyStatus::Ok, response))
	}

	/// Answers `request` with `status: "error"`.
	pub fn reply_error(&self, request: &Frame, response: Value) -> bool {
		self.send(&request.reply(ReplyStatus::Error, response))
	}

	/// Pushes a server event on `topic`.
	pub fn push(&self, topic: &str, event: &str, payload: Value) -> bool {
		self.send(&Frame::push(topic, event, payload))
	}
}
