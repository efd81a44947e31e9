//! Entity identifier newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host-assigned identifier of an entity, conventionally
/// `"<domain>.<object>"` (e.g. `"switch.hall"`).
///
/// Unlike generated identifiers, entity ids are chosen by the host and
/// arrive on every state-change notification, so they are kept as plain
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a host entity id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Access the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The domain part of the id — everything before the first `.`,
    /// or the whole id when there is none.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
