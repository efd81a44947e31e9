//! Simulated devices.

mod dimmer;
mod switch;

pub use dimmer::VirtualDimmer;
pub use switch::VirtualSwitch;
