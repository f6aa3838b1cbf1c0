use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use taxi_protocol::Frame;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::*;

#[tokio::test]
async fn test_memory_send_reaches_server() {
	let (parts, mut server) = MemoryTransport::pair();
	let TransportParts { mut sender, .. } = parts;

	let frame = Frame::push("customer:luciano", "ping", json!({"n": 1}));
	sender.send(serde_json::to_value(&frame).unwrap()).await.unwrap();

	let received = server.recv().await.unwrap();
	assert_eq!(received, frame);
}

#[tokio::test]
async fn test_memory_receiver_forwards_until_server_drops() {
	let (parts, server) = MemoryTransport::pair();
	let TransportParts {
		receiver,
		mut message_rx,
		..
	} = parts;

	let read_task = tokio::spawn(receiver.run());

	assert!(server.push("customer:luciano", "greetings", json!({"hi": true})));
	let value = message_rx.recv().await.unwrap();
	assert_eq!(value[3], "greetings");

	drop(server);
	read_task.await.unwrap().unwrap();
	assert!(message_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_memory_send_fails_after_server_drop() {
	let (parts, server) = MemoryTransport::pair();
	let TransportParts { mut sender, .. } = parts;
	drop(server);

	let result = sender.send(json!({})).await;
	assert!(result.is_err());
}

#[tokio::test]
async fn test_memory_server_skips_non_frames() {
	let (parts, mut server) = MemoryTransport::pair();
	let TransportParts { mut sender, .. } = parts;

	sender.send(json!({"not": "a frame"})).await.unwrap();
	let frame = Frame::push("phoenix", "heartbeat", json!({}));
	sender.send(serde_json::to_value(&frame).unwrap()).await.unwrap();

	assert_eq!(server.recv().await.unwrap().event, "heartbeat");
}

#[tokio::test]
async fn test_websocket_round_trip() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server_task = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

		let incoming = ws.next().await.unwrap().unwrap();
		let text = incoming.into_text().unwrap();
		let frame: Frame = serde_json::from_str(&text).unwrap();
		assert_eq!(frame.event, "phx_join");

		ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
		let push = Frame::push(frame.topic.clone(), "greetings", json!({"hello": "luciano"}));
		ws.send(WsMessage::Text(serde_json::to_string(&push).unwrap()))
			.await
			.unwrap();
		ws.close(None).await.unwrap();
	});

	let (transport, message_rx) = WebSocketTransport::connect(&format!("ws://{addr}")).await.unwrap();
	let TransportParts {
		mut sender,
		receiver,
		mut message_rx,
	} = transport.into_transport_parts(message_rx);
	let read_task = tokio::spawn(receiver.run());

	let join = Frame::request(Some("1".into()), "1".into(), "customer:luciano", "phx_join", json!({"token": "123"}));
	sender.send(serde_json::to_value(&join).unwrap()).await.unwrap();

	let value = message_rx.recv().await.unwrap();
	let push: Frame = serde_json::from_value(value).unwrap();
	assert_eq!(push.topic, "customer:luciano");
	assert_eq!(push.payload["hello"], "luciano");

	read_task.await.unwrap().unwrap();
	server_task.await.unwrap();
}

#[tokio::test]
async fn test_websocket_connect_failure() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);

	let result = WebSocketTransport::connect(&format!("ws://{addr}")).await;
	assert!(matches!(result, Err(crate::Error::ConnectionFailed(_))));
}
