//! Structured logging setup for Waypoint host applications.
//!
//! A separate crate so the engine itself never pulls in `tracing-subscriber`
//! (a library just emits spans and events; only a binary should install a
//! global subscriber).

pub mod tracing_setup;
