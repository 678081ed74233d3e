//! Test helpers shared by unit and integration tests.
//!
//! Compiled for unit tests and, through the `test-util` feature, for the
//! integration tests under `tests/`.

pub mod scripted_connector;

pub use scripted_connector::{ScriptedConnection, ScriptedConnector, WriteGate};
