//! Fluentd forward envelope encoding.
//!
//! Each [`LogEvent`] becomes a `[tag, timestamp, fields]` array serialised
//! as MessagePack (the native forward protocol encoding) or JSON. Payloads
//! are self-delimiting and written back to back on the stream.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::log_event::LogEvent;

use super::config::DEFAULT_MAX_PAYLOAD_SIZE;

const TAG_PREFIX: &str = "docker.";
const LABEL_PREFIX: &str = "docker.label.";

/// Errors raised while encoding an event. None of them are retryable.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("messagepack serialisation failed: {0}")]
    MessagePack(#[from] rmp_serde::encode::Error),
    #[error("json serialisation failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The forward protocol carries the event time as a 32-bit integer.
    #[error("timestamp {0} does not fit in 32 bits")]
    TimestampOutOfRange(i64),
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// Serialisation used for the envelope array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    #[default]
    MessagePack,
    Json,
}

impl PayloadFormat {
    /// Parse a route option value (`msgpack` or `json`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "msgpack" | "messagepack" => Some(Self::MessagePack),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// The `[tag, timestamp, fields]` triple sent to the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardEnvelope {
    pub tag: String,
    pub timestamp: i32,
    pub fields: BTreeMap<String, String>,
}

impl ForwardEnvelope {
    /// Build the envelope for `event` stamped with `timestamp`.
    pub fn from_event(event: &LogEvent, timestamp: i32) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("message".to_owned(), event.message.clone());
        fields.insert("docker.hostname".to_owned(), event.hostname.clone());
        fields.insert("docker.id".to_owned(), event.id.clone());
        fields.insert("docker.image".to_owned(), event.image.clone());
        fields.insert("docker.name".to_owned(), event.name.clone());
        for (label, value) in &event.labels {
            fields.insert(format!("{LABEL_PREFIX}{label}"), value.clone());
        }
        Self {
            tag: format!("{TAG_PREFIX}{}", event.hostname),
            timestamp,
            fields,
        }
    }
}

impl Serialize for ForwardEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.tag, self.timestamp, &self.fields).serialize(serializer)
    }
}

/// Serialised envelope ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedPayload(Vec<u8>);

impl EncodedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

/// Encodes events into forward protocol payloads.
#[derive(Clone, Copy, Debug)]
pub struct ForwardEncoder {
    format: PayloadFormat,
    max_payload_size: usize,
}

impl Default for ForwardEncoder {
    fn default() -> Self {
        Self::new(PayloadFormat::default(), DEFAULT_MAX_PAYLOAD_SIZE)
    }
}

impl ForwardEncoder {
    pub fn new(format: PayloadFormat, max_payload_size: usize) -> Self {
        Self {
            format,
            max_payload_size,
        }
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Encode `event` stamped with the current wall-clock second.
    pub fn encode(&self, event: &LogEvent) -> Result<EncodedPayload, EncodeError> {
        self.encode_at(event, chrono::Utc::now().timestamp())
    }

    /// Encode `event` stamped with `timestamp` seconds since the epoch.
    pub fn encode_at(&self, event: &LogEvent, timestamp: i64) -> Result<EncodedPayload, EncodeError> {
        let timestamp =
            i32::try_from(timestamp).map_err(|_| EncodeError::TimestampOutOfRange(timestamp))?;
        let envelope = ForwardEnvelope::from_event(event, timestamp);
        let buf = match self.format {
            PayloadFormat::MessagePack => {
                let mut buf = Vec::with_capacity(128);
                envelope.serialize(&mut rmp_serde::Serializer::new(&mut buf))?;
                buf
            }
            PayloadFormat::Json => serde_json::to_vec(&envelope)?,
        };
        if buf.len() > self.max_payload_size {
            return Err(EncodeError::PayloadTooLarge {
                size: buf.len(),
                limit: self.max_payload_size,
            });
        }
        Ok(EncodedPayload(buf))
    }
}

/// Encode `event` with the default encoder (MessagePack, 1 MiB limit).
pub fn encode(event: &LogEvent) -> Result<EncodedPayload, EncodeError> {
    ForwardEncoder::default().encode(event)
}
