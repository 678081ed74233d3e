//! Fluentd forward output for a log-routing host.
//!
//! Events are encoded as forward protocol envelopes by
//! [`ForwardEncoder`](forward::ForwardEncoder) and delivered by
//! [`ResilientTransport`](forward::ResilientTransport), which retries
//! transient write failures and reconnects with exponential backoff.

pub mod bootstrap;
pub mod builder;
pub mod forward;
pub mod log_event;
pub mod rate_limited_warner;
pub mod registry;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use builder::{BuildError, ForwarderBuilder};
pub use forward::{
    AdapterHandle, ConnectError, DeliveryError, EncodeError, EncodedPayload, FluentdAdapter,
    ForwardEncoder, ForwardEnvelope, ForwardError, ForwarderConfig, HandleError, LogAdapter,
    PayloadFormat, ResilientTransport, RetryPolicy, StreamSummary, TcpEndpoint, encode,
};
pub use log_event::LogEvent;
pub use registry::{AdapterRegistry, FactoryError, Route, TransportRegistry};
