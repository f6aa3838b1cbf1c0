//! Event and topic names used on the channel socket.

/// Join request sent by the client.
pub const PHX_JOIN: &str = "phx_join";

/// Leave request sent by the client.
pub const PHX_LEAVE: &str = "phx_leave";

/// Reply to any client request carrying a `ref`.
pub const PHX_REPLY: &str = "phx_reply";

/// Server-side channel crash.
pub const PHX_ERROR: &str = "phx_error";

/// Server closed the channel.
pub const PHX_CLOSE: &str = "phx_close";

/// Socket keepalive event, always on [`PHOENIX_TOPIC`].
pub const HEARTBEAT: &str = "heartbeat";

/// Reserved topic for socket-level messages.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Informational greeting pushed after join.
pub const GREETINGS: &str = "greetings";

/// Booking status push carrying `{mensaje}`.
pub const BOOKING_REQUEST: &str = "booking_request";

/// Returns true for events the socket layer handles itself.
pub fn is_control_event(event: &str) -> bool {
	matches!(event, PHX_JOIN | PHX_LEAVE | PHX_REPLY | HEARTBEAT)
}
