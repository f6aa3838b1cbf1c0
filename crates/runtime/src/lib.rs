//! Taxi Runtime - channel socket transport, correlation, and routing
//!
//! This crate provides the low-level runtime for talking to a Phoenix-style
//! channel server:
//!
//! - **Transport**: bidirectional JSON messages over WebSocket or in-memory pipes
//! - **Connection**: ref allocation, `phx_reply` correlation, heartbeats
//! - **Routing**: delivering pushes to the session that owns a topic
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │    taxi      │  Channel sessions, booking dispatcher
//! └──────┬───────┘
//!        │ implements TopicRoute
//! ┌──────▼───────┐
//! │ taxi-runtime │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  Ref correlation, routing, heartbeat
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket / memory transport
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod transport;

pub use connection::{Connection, PendingReply, RouteTable, TopicRoute};
pub use error::{Error, Result};
pub use transport::{
	MemoryServer, MemoryTransport, Transport, TransportParts, TransportReceiver, WebSocketTransport,
	WebSocketTransportReceiver, WebSocketTransportSender,
};
