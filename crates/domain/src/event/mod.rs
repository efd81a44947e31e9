//! Event descriptors — classes of external notification, optionally
//! narrowed by a condition.
//!
//! Each event kind has a fixed argument-name set its filters are checked
//! against at construction time: `{event}` for bus events,
//! `{entity_id, old, new}` for state events.

mod bus;
mod state;

pub use bus::{BUS_EVENT_ARGS, BusEvent, bus_condition};
pub use state::{
    STATE_EVENT_ARGS, StateEvent, new_state_condition, old_state_condition, state_condition,
};
