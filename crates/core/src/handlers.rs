//! Channel event handler registry.
//!
//! One handler per event name; registering again for the same name replaces
//! the previous handler. Registration returns a [`Subscription`] that removes
//! the handler on drop, unless a newer handler has replaced it meanwhile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Handler function: event payload in, nothing out.
pub type HandlerFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Registered handler with its ID.
#[derive(Clone)]
pub struct HandlerEntry {
	pub id: HandlerId,
	pub handler: HandlerFn,
}

/// Handler storage keyed by event name.
pub type HandlerMap = Arc<Mutex<HashMap<String, HandlerEntry>>>;

/// Per-session event handler table.
#[derive(Clone, Default)]
pub struct EventHandlers {
	map: HandlerMap,
}

impl EventHandlers {
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs `handler` for `event`, replacing any previous one.
	pub fn set<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(Value) + Send + Sync + 'static,
	{
		let id = next_handler_id();
		let previous = self.map.lock().insert(
			event.to_string(),
			HandlerEntry {
				id,
				handler: Arc::new(handler),
			},
		);
		if let Some(previous) = previous {
			tracing::debug!(event, replaced = previous.id, id, "Replaced event handler");
		}

		Subscription::from_handler_map(event, id, &self.map)
	}

	/// Calls the handler for `event`. Returns false when none is registered.
	///
	/// The handler runs outside the table lock, so it may register or remove
	/// handlers itself.
	pub fn dispatch(&self, event: &str, payload: Value) -> bool {
		let handler = self.map.lock().get(event).map(|entry| Arc::clone(&entry.handler));
		match handler {
			Some(handler) => {
				handler(payload);
				true
			}
			None => false,
		}
	}

	pub fn contains(&self, event: &str) -> bool {
		self.map.lock().contains_key(event)
	}

	pub fn len(&self) -> usize {
		self.map.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.lock().is_empty()
	}

	/// Removes every handler.
	pub fn clear(&self) {
		self.map.lock().clear();
	}
}

/// RAII handle that unregisters an event handler on drop.
///
/// Holds a weak reference to the handler table, so dropping it after the
/// owning session is gone is a no-op.
#[must_use = "dropping a Subscription unregisters its handler; call `.detach()` to keep it"]
pub struct Subscription {
	event: String,
	id: HandlerId,
	map: Option<Weak<Mutex<HashMap<String, HandlerEntry>>>>,
}

impl Subscription {
	/// Creates a subscription bound to `handlers` using a weak reference.
	pub fn from_handler_map(event: &str, id: HandlerId, handlers: &HandlerMap) -> Self {
		Self {
			event: event.to_string(),
			id,
			map: Some(Arc::downgrade(handlers)),
		}
	}

	/// A subscription bound to nothing.
	pub fn inert(event: &str) -> Self {
		Self {
			event: event.to_string(),
			id: 0,
			map: None,
		}
	}

	/// Returns this subscription's handler ID.
	pub fn id(&self) -> HandlerId {
		self.id
	}

	pub fn event(&self) -> &str {
		&self.event
	}

	/// Keeps the handler registered for the rest of the session.
	pub fn detach(mut self) {
		self.map = None;
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.remove();
	}

	fn remove(&mut self) {
		let Some(map) = self.map.take().and_then(|weak| weak.upgrade()) else {
			return;
		};
		let mut map = map.lock();
		if map.get(&self.event).is_some_and(|entry| entry.id == self.id) {
			map.remove(&self.event);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.remove();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("event", &self.event)
			.field("id", &self.id)
			.field("active", &self.map.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use serde_json::json;

	use super::*;

	#[test]
	fn test_handler_id_increments() {
		let id1 = next_handler_id();
		let id2 = next_handler_id();
		assert!(id2 > id1);
	}

	#[test]
	fn test_dispatch_calls_registered_handler() {
		let handlers = EventHandlers::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let seen_clone = Arc::clone(&seen);

		handlers
			.set("booking_request", move |payload| seen_clone.lock().push(payload))
			.detach();

		assert!(handlers.dispatch("booking_request", json!({"mensaje": "hola"})));
		assert!(!handlers.dispatch("greetings", json!({})));
		assert_eq!(seen.lock().as_slice(), [json!({"mensaje": "hola"})]);
	}

	#[test]
	fn test_later_registration_replaces() {
		let handlers = EventHandlers::new();
		let first = Arc::new(AtomicUsize::new(0));
		let second = Arc::new(AtomicUsize::new(0));

		let f = Arc::clone(&first);
		handlers.set("booking_request", move |_| {
			f.fetch_add(1, Ordering::SeqCst);
		}).detach();
		let s = Arc::clone(&second);
		handlers.set("booking_request", move |_| {
			s.fetch_add(1, Ordering::SeqCst);
		}).detach();

		handlers.dispatch("booking_request", json!({}));
		assert_eq!(first.load(Ordering::SeqCst), 0);
		assert_eq!(second.load(Ordering::SeqCst), 1);
		assert_eq!(handlers.len(), 1);
	}

	#[test]
	fn test_subscription_drop_removes_handler() {
		let handlers = EventHandlers::new();
		{
			let _sub = handlers.set("greetings", |_| {});
			assert!(handlers.contains("greetings"));
		}
		assert!(!handlers.contains("greetings"));
	}

	#[test]
	fn test_stale_subscription_keeps_replacement() {
		let handlers = EventHandlers::new();
		let old = handlers.set("greetings", |_| {});
		let new = handlers.set("greetings", |_| {});

		drop(old);
		assert!(handlers.contains("greetings"));

		new.unsubscribe();
		assert!(!handlers.contains("greetings"));
	}

	#[test]
	fn test_subscription_weak_reference() {
		let handlers = EventHandlers::new();
		let sub = handlers.set("greetings", |_| {});
		drop(handlers);
		// Table is gone; dropping must not panic.
		drop(sub);
	}

	#[test]
	fn test_handler_may_reenter_table() {
		let handlers = EventHandlers::new();
		let inner = handlers.clone();
		handlers
			.set("booking_request", move |_| {
				inner.clear();
			})
			.detach();

		assert!(handlers.dispatch("booking_request", json!({})));
		assert!(handlers.is_empty());
	}
}
