//! Fluentd forward adapter implementation.
//!
//! This module defines `FluentdAdapter`, which encodes
//! [`LogEvent`](crate::log_event::LogEvent) values into forward protocol
//! envelopes and writes them to a collector over a long-lived socket. The
//! transport retries transient write failures on the same connection,
//! reconnects with exponential backoff when the connection is broken, and
//! never gives up on later events after a failed one.

mod adapter;
pub mod config;
pub mod envelope;
mod resilient;
pub mod retry;
pub mod transport;


pub use adapter::{AdapterHandle, FluentdAdapter, ForwardError, HandleError, LogAdapter, StreamSummary};
pub use config::{ConfigError, ForwarderConfig};
pub use envelope::{EncodeError, EncodedPayload, ForwardEncoder, ForwardEnvelope, PayloadFormat, encode};
pub use resilient::{ConnectError, DeliveryError, ResilientTransport};
pub use retry::RetryPolicy;
pub use transport::{
    ActiveConnection, Connection, Connector, FramedConnection, SocketStream, TcpEndpoint,
    TlsOptions, WriteError, WriteFailure,
};
