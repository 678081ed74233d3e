#![allow(dead_code)]

pub mod collector;

pub use collector::{Collector, Record, Session, Wire, closed_address};

use fluentd_forward::LogEvent;

/// Event attributed to container `/c1` on host `h1`.
pub fn container_event(message: &str) -> LogEvent {
    LogEvent::new(message)
        .with_hostname("h1")
        .with_id("abc123")
        .with_image("img:latest")
        .with_name("/c1")
        .with_label("env", "prod")
}
