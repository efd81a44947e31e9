//! State values and the state-change notifications delivered by the host.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::ArgMap;
use crate::id::EntityId;

/// UTC timestamp stamped on notifications.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Opaque entity state as seen by the host: a scalar `state` plus
/// arbitrary attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    /// Scalar state, e.g. `"on"`, `"off"`, `"23.5"`.
    pub state: String,
    /// Additional host attributes.
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl StateValue {
    /// A state value with no attributes.
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: serde_json::Value::Null,
        }
    }

    /// A state value with attributes attached.
    #[must_use]
    pub fn with_attributes(state: impl Into<String>, attributes: serde_json::Value) -> Self {
        Self {
            state: state.into(),
            attributes,
        }
    }

    /// Render as a JSON value for use in condition argument maps.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.state,
            "attributes": self.attributes,
        })
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.state)
    }
}

/// A state-change notification: one entity moved from `old` to `new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: EntityId,
    pub old: StateValue,
    pub new: StateValue,
    pub time_fired: Timestamp,
}

impl StateChange {
    /// Build a notification stamped with the current time.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, old: StateValue, new: StateValue) -> Self {
        Self {
            entity_id: entity_id.into(),
            old,
            new,
            time_fired: now(),
        }
    }

    /// The condition argument map for this notification:
    /// `{entity_id, old, new}`.
    #[must_use]
    pub fn arg_map(&self) -> ArgMap {
        BTreeMap::from([
            (
                "entity_id".to_string(),
                serde_json::Value::String(self.entity_id.to_string()),
            ),
            ("old".to_string(), self.old.to_value()),
            ("new".to_string(), self.new.to_value()),
        ])
    }
}

impl std::fmt::Display for StateChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.entity_id, self.old, self.new)
    }
}
