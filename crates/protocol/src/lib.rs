//! Wire types shared by the taxi runtime and client crates.
//!
//! - [`frame`]: Phoenix Channels V2 frames (`[join_ref, ref, topic, event, payload]`)
//! - [`booking`]: booking-creation body, join payload, and status messages

pub mod booking;
pub mod events;
pub mod frame;

pub use booking::{BookingBody, JoinPayload, StatusMessage, topic_for};
pub use frame::{Frame, ReplyPayload, ReplyStatus};

/// Serializer version appended to the socket URL as `vsn`.
pub const PROTOCOL_VSN: &str = "2.0.0";
