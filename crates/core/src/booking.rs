//! Booking request values.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use taxi_protocol::BookingBody;

use crate::identity::Identity;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id attached to each submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(u64);

impl CorrelationId {
	pub fn next() -> Self {
		Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst))
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl From<u64> for CorrelationId {
	fn from(value: u64) -> Self {
		Self(value)
	}
}

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// A trip the customer wants booked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
	pub id: CorrelationId,
	pub pickup_address: String,
	pub dropoff_address: String,
	pub identity: Identity,
}

impl BookingRequest {
	pub fn new(pickup_address: impl Into<String>, dropoff_address: impl Into<String>, identity: Identity) -> Self {
		Self {
			id: CorrelationId::next(),
			pickup_address: pickup_address.into(),
			dropoff_address: dropoff_address.into(),
			identity,
		}
	}

	/// Wire body. `request_id` is only sent when correlation is on.
	pub fn to_body(&self, include_id: bool) -> BookingBody {
		BookingBody {
			pickup_address: self.pickup_address.clone(),
			dropoff_address: self.dropoff_address.clone(),
			username: self.identity.to_string(),
			request_id: include_id.then_some(self.id.get()),
		}
	}
}
