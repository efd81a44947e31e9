//! # homescript-app
//!
//! Engine runtime — execution contexts and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - [`ports::Effector`] — a host object whose bound operations become
//!     actions
//!   - [`ports::StatePublisher`] — deliver state-change notifications
//! - Provide **in-process infrastructure** (state bus) that needs no IO
//! - Own the runtime pieces of the engine:
//!   - [`script::Script`] — per-name single-flight execution context
//!   - [`dispatch::StateEventManager`] — entity-id → registration index
//!   - [`engine::Engine`] — registration, notification loop, shutdown
//!
//! ## Dependency rule
//! Depends on `homescript-domain` only (plus `tokio` for tasks and
//! channels). Never imports adapter crates; adapters depend on *this*
//! crate, not the reverse.

pub mod dispatch;
pub mod effectors;
pub mod engine;
pub mod event_bus;
pub mod ports;
pub mod script;
