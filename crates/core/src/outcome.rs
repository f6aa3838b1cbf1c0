//! Last-write-wins booking status.
//!
//! The booking reply and every `booking_request` push write into the same
//! [`OutcomeSink`]. Whichever arrives last is what readers see. Submission
//! failures go to a separate slot so the last good status stays readable.

use tokio::sync::watch;

use crate::booking::CorrelationId;

/// Where a status update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
	/// Body of the booking-creation response.
	Reply,
	/// `booking_request` push on the customer channel.
	Push,
}

/// One status message shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
	pub message: String,
	pub source: OutcomeSource,
	pub request_id: Option<CorrelationId>,
}

/// A submission that did not produce a status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
	pub message: String,
	pub status: Option<u16>,
	pub request_id: Option<CorrelationId>,
}

/// Snapshot of the outcome slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingOutcome {
	/// Most recent status, whatever its source.
	pub latest: Option<StatusUpdate>,
	/// Failure of the latest submission, cleared by the next status update.
	pub failure: Option<FailureNotice>,
	/// Bumped on every write.
	pub version: u64,
}

impl BookingOutcome {
	pub fn message(&self) -> Option<&str> {
		self.latest.as_ref().map(|u| u.message.as_str())
	}
}

/// Write side of the outcome slot.
#[derive(Debug)]
pub struct OutcomeSink {
	tx: watch::Sender<BookingOutcome>,
}

impl Default for OutcomeSink {
	fn default() -> Self {
		Self::new()
	}
}

impl OutcomeSink {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(BookingOutcome::default());
		Self { tx }
	}

	/// Overwrites the status message and clears any failure.
	pub fn publish(&self, update: StatusUpdate) {
		tracing::debug!(source = ?update.source, message = %update.message, "Booking status updated");
		self.tx.send_modify(|outcome| {
			outcome.latest = Some(update);
			outcome.failure = None;
			outcome.version += 1;
		});
	}

	/// Records a failure. The last status message is left untouched.
	pub fn report_failure(&self, failure: FailureNotice) {
		tracing::debug!(status = ?failure.status, message = %failure.message, "Booking submission failed");
		self.tx.send_modify(|outcome| {
			outcome.failure = Some(failure);
			outcome.version += 1;
		});
	}

	pub fn current(&self) -> BookingOutcome {
		self.tx.borrow().clone()
	}

	pub fn reader(&self) -> OutcomeReader {
		OutcomeReader { rx: self.tx.subscribe() }
	}
}

/// Read side of the outcome slot.
#[derive(Debug, Clone)]
pub struct OutcomeReader {
	rx: watch::Receiver<BookingOutcome>,
}

impl OutcomeReader {
	pub fn current(&self) -> BookingOutcome {
		self.rx.borrow().clone()
	}

	/// Returns the current snapshot and marks it seen, so
	/// [`changed`](Self::changed) only reports later writes.
	pub fn observe(&mut self) -> BookingOutcome {
		self.rx.borrow_and_update().clone()
	}

	/// Latest status message, if any.
	pub fn message(&self) -> Option<String> {
		self.rx.borrow().message().map(str::to_string)
	}

	/// Waits for the next write and returns the new snapshot.
	///
	/// Returns [`None`] once the sink is gone.
	pub async fn changed(&mut self) -> Option<BookingOutcome> {
		self.rx.changed().await.ok()?;
		Some(self.rx.borrow_and_update().clone())
	}
}
