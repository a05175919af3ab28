//! Core infrastructure shared by the connection resilience crates.
//!
//! Every component in the workspace reports what it is doing through typed
//! events. This crate holds the pieces they have in common:
//! - [`ResilienceEvent`]: the trait every event type implements
//! - [`Severity`]: the log level an event maps onto
//! - [`EventListeners`]: a panic-isolated fan-out of listeners

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent, Severity};
