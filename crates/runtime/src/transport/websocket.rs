//! WebSocket transport: one JSON document per text frame.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Transport, TransportFuture, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to the channel server.
pub struct WebSocketTransport {
	sink: SplitSink<WsStream, WsMessage>,
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport {
	/// Connects to `url` and returns the transport with its inbound message channel.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		tracing::debug!(%url, "Connecting channel websocket");
		let (ws, response) = connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		tracing::debug!(status = %response.status(), "Channel websocket connected");

		let (sink, stream) = ws.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		Ok((
			Self {
				sink,
				stream,
				message_tx,
			},
			message_rx,
		))
	}

	/// Splits into independent sending and reading halves.
	pub fn into_parts(self) -> (WebSocketTransportSender, WebSocketTransportReceiver) {
		(
			WebSocketTransportSender { sink: self.sink },
			WebSocketTransportReceiver {
				stream: self.stream,
				message_tx: self.message_tx,
			},
		)
	}

	/// Packages both halves and the inbound channel for [`Connection::new`](crate::Connection::new).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Sending half of [`WebSocketTransport`].
pub struct WebSocketTransportSender {
	sink: SplitSink<WsStream, WsMessage>,
}

impl Transport for WebSocketTransportSender {
	fn send(&mut self, message: Value) -> TransportFuture<'_> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			tracing::trace!(%text, "ws send");
			self.sink.send(WsMessage::Text(text)).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> TransportFuture<'_> {
		Box::pin(async move {
			self.sink.close().await?;
			Ok(())
		})
	}
}

/// Reading half of [`WebSocketTransport`].
pub struct WebSocketTransportReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketTransportReceiver {
	fn run(self: Box<Self>) -> TransportFuture<'static> {
		let Self {
			mut stream,
			message_tx,
		} = *self;

		Box::pin(async move {
			while let Some(frame) = stream.next().await {
				let decoded = match frame? {
					WsMessage::Text(text) => serde_json::from_str::<Value>(&text),
					WsMessage::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
					WsMessage::Close(frame) => {
						tracing::debug!(?frame, "Channel websocket closed by peer");
						return Ok(());
					}
					WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
				};

				let value = match decoded {
					Ok(value) => value,
					Err(e) => {
						tracing::warn!(error = %e, "Dropping undecodable websocket frame");
						continue;
					}
				};

				if message_tx.send(value).is_err() {
					// Connection dropped its receiver; nothing left to feed.
					return Ok(());
				}
			}
			Ok(())
		})
	}
}
