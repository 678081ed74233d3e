//! Log event representation consumed by the forwarding adapter.
//!
//! A `LogEvent` describes one line emitted by a container: the raw message
//! plus the identifiers of the container that produced it. Hosts construct
//! events directly or deserialise them from JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One log line together with the metadata of its source container.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEvent {
    /// Raw message text.
    pub message: String,
    /// Hostname configured for the source container.
    pub hostname: String,
    /// Container identifier.
    pub id: String,
    /// Image the container was started from.
    pub image: String,
    /// Human-readable container name.
    pub name: String,
    /// Arbitrary container labels.
    pub labels: BTreeMap<String, String>,
}

impl LogEvent {
    /// Construct an event carrying `message` with empty source metadata.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a label, replacing any previous value stored under `key`.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} - {}", self.hostname, self.name, self.message)
    }
}
