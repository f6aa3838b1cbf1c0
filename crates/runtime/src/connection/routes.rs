//! Topic routing table.
//!
//! Every joined channel registers a [`TopicRoute`] under its topic together
//! with the join ref it was registered for. Frames that carry a different
//! join ref belong to an earlier join of the same topic and are dropped, and
//! removal only succeeds for the join ref that registered the route, so a
//! late teardown cannot evict a newer session on the same topic.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Receiver of events routed to a single topic.
pub trait TopicRoute: Send + Sync {
	/// Handles a non-reply event for this topic.
	fn on_event(&self, event: &str, payload: Value);

	/// Called once when the underlying socket goes away.
	fn on_disconnect(&self, reason: &str);
}

struct RouteEntry {
	join_ref: Arc<str>,
	route: Arc<dyn TopicRoute>,
}

/// Thread-safe registry of topic routes.
#[derive(Default)]
pub struct RouteTable {
	routes: DashMap<Arc<str>, RouteEntry>,
}

impl RouteTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `route` for `topic`, replacing any previous registration.
	///
	/// Returns the join ref of the replaced route, if any.
	pub fn insert(&self, topic: &str, join_ref: &str, route: Arc<dyn TopicRoute>) -> Option<Arc<str>> {
		self.routes
			.insert(
				Arc::from(topic),
				RouteEntry {
					join_ref: Arc::from(join_ref),
					route,
				},
			)
			.map(|old| old.join_ref)
	}

	/// Removes the route for `topic` if it is still owned by `join_ref`.
	pub fn remove(&self, topic: &str, join_ref: &str) -> bool {
		self.routes
			.remove_if(topic, |_, entry| entry.join_ref.as_ref() == join_ref)
			.is_some()
	}

	/// Looks up the route a frame should be delivered to.
	///
	/// A frame without a join ref is a broadcast and goes to whichever join
	/// currently owns the topic.
	pub fn resolve(&self, topic: &str, join_ref: Option<&str>) -> Option<Arc<dyn TopicRoute>> {
		let entry = self.routes.get(topic)?;
		match join_ref {
			Some(frame_ref) if frame_ref != entry.join_ref.as_ref() => {
				tracing::debug!(
					topic,
					frame_ref,
					current_ref = %entry.join_ref,
					"Dropping frame for stale join"
				);
				None
			}
			_ => Some(Arc::clone(&entry.route)),
		}
	}

	pub fn contains(&self, topic: &str) -> bool {
		self.routes.contains_key(topic)
	}

	pub fn len(&self) -> usize {
		self.routes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.routes.is_empty()
	}

	/// Snapshot of all routes, for socket-wide notifications.
	pub fn all(&self) -> Vec<Arc<dyn TopicRoute>> {
		self.routes.iter().map(|entry| Arc::clone(&entry.route)).collect()
	}
}
