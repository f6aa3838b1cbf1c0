//! Customer identity that scopes a channel.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Opaque user-facing name. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(Arc<str>);

impl Identity {
	/// Validates and wraps a name. Empty and whitespace-only names are rejected.
	pub fn new(name: impl AsRef<str>) -> Result<Self> {
		let name = name.as_ref();
		if name.trim().is_empty() {
			return Err(Error::InvalidIdentity(name.to_string()));
		}
		Ok(Self(Arc::from(name)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Topic for this identity under `role`, e.g. `customer:luciano`.
	pub fn topic(&self, role: &str) -> String {
		taxi_protocol::topic_for(role, &self.0)
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for Identity {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl TryFrom<&str> for Identity {
	type Error = Error;

	fn try_from(value: &str) -> Result<Self> {
		Self::new(value)
	}
}

impl TryFrom<String> for Identity {
	type Error = Error;

	fn try_from(value: String) -> Result<Self> {
		Self::new(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_builds_topic() {
		let id = Identity::new("luciano").unwrap();
		assert_eq!(id.topic("customer"), "customer:luciano");
		assert_eq!(id.to_string(), "luciano");
	}

	#[test]
	fn blank_identity_is_rejected() {
		assert!(matches!(Identity::new(""), Err(Error::InvalidIdentity(_))));
		assert!(matches!(Identity::try_from("   "), Err(Error::InvalidIdentity(_))));
	}

	#[test]
	fn identities_compare_by_name() {
		assert_eq!(Identity::new("alice").unwrap(), Identity::try_from("alice".to_string()).unwrap());
		assert_ne!(Identity::new("alice").unwrap(), Identity::new("bob").unwrap());
	}
}
