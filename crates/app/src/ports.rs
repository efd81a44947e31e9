//! Port definitions — the boundaries between the engine and the host.
//!
//! Ports are defined here so that the engine and the adapter crates can
//! depend on them without depending on each other.

use homescript_domain::action::Action;
use homescript_domain::id::EntityId;
use homescript_domain::state::{StateChange, StateValue};

/// A host object an action ultimately calls.
///
/// Effectors expose their operations as bound [`Action`]s: the adapter
/// captures its own handle inside each action's function once, when the
/// effector is constructed. Domain-specific proxies that narrow or
/// validate an effector's parameter surface sit between an adapter and
/// this trait; the engine only ever sees the trait.
pub trait Effector: Send + Sync {
    /// The domain this effector belongs to, e.g. `"light"`.
    fn domain(&self) -> &str;

    /// The entity this effector controls.
    fn entity_id(&self) -> &EntityId;

    /// Snapshot of the entity's current state.
    fn state(&self) -> StateValue;

    /// The named operation as a bound action, or `None` when the effector
    /// does not support it.
    fn action(&self, operation: &str) -> Option<Action>;
}

/// Outbound delivery of state-change notifications.
pub trait StatePublisher: Send + Sync {
    /// Publish a notification. Delivery with no listeners is not an error.
    fn publish(&self, change: StateChange);
}
