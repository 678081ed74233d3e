//! Streaming entry point tying the encoder to the resilient transport.

use std::thread;

use crossbeam_channel::{Receiver, SendError, Sender, TrySendError, bounded};
use log::warn;
use parking_lot::Mutex;
use thiserror::Error;

use crate::{log_event::LogEvent, rate_limited_warner::RateLimitedWarner};

use super::{
    config::ForwarderConfig,
    envelope::{EncodeError, ForwardEncoder},
    resilient::{ConnectError, DeliveryError, ResilientTransport},
    transport::Connector,
};

/// Outcome of forwarding a single event.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to deliver event: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Counters describing one stream run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub delivered: u64,
    pub encode_failures: u64,
    pub delivery_failures: u64,
}

impl StreamSummary {
    fn record(&mut self, outcome: &Result<(), ForwardError>) {
        match outcome {
            Ok(()) => self.delivered += 1,
            Err(ForwardError::Encode(_)) => self.encode_failures += 1,
            Err(ForwardError::Delivery(_)) => self.delivery_failures += 1,
        }
    }

    /// Total number of events consumed.
    pub fn total(&self) -> u64 {
        self.delivered + self.encode_failures + self.delivery_failures
    }
}

/// A log output consuming a sequence of events until it ends.
pub trait LogAdapter: Send {
    fn stream(&mut self, events: &mut dyn Iterator<Item = LogEvent>) -> StreamSummary;
}

/// Adapter streaming events to a Fluentd collector.
pub struct FluentdAdapter<C: Connector> {
    encoder: ForwardEncoder,
    transport: ResilientTransport<C>,
}

impl<C: Connector> FluentdAdapter<C> {
    /// Connect to the collector. Fails when the first connection attempt
    /// fails; that attempt is not retried.
    pub fn open(connector: C, config: &ForwarderConfig) -> Result<Self, ConnectError> {
        let transport = ResilientTransport::open(connector, config.retry.clone())?;
        Ok(Self::with_transport(
            ForwardEncoder::new(config.format, config.max_payload_size),
            transport,
        ))
    }

    pub fn with_transport(encoder: ForwardEncoder, transport: ResilientTransport<C>) -> Self {
        Self { encoder, transport }
    }

    pub fn transport(&self) -> &ResilientTransport<C> {
        &self.transport
    }

    /// Encode and deliver one event.
    pub fn forward(&mut self, event: &LogEvent) -> Result<(), ForwardError> {
        let payload = self.encoder.encode(event)?;
        self.transport.deliver(payload)?;
        Ok(())
    }

    /// Forward every event in order until `events` is exhausted.
    ///
    /// Failures are logged and counted; they never stop the stream.
    pub fn stream<I>(&mut self, events: I) -> StreamSummary
    where
        I: IntoIterator<Item = LogEvent>,
    {
        let mut summary = StreamSummary::default();
        for event in events {
            let outcome = self.forward(&event);
            if let Err(err) = &outcome {
                warn!("FluentdAdapter dropped event from {:?}: {err}", event.name);
            }
            summary.record(&outcome);
        }
        summary
    }
}

impl<C: Connector> LogAdapter for FluentdAdapter<C> {
    fn stream(&mut self, events: &mut dyn Iterator<Item = LogEvent>) -> StreamSummary {
        FluentdAdapter::stream(self, events)
    }
}

/// Errors returned when handing events to a spawned adapter. The rejected
/// event is handed back so the caller decides what happens to it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("adapter queue is full")]
    QueueFull(LogEvent),
    #[error("adapter is closed")]
    Closed(LogEvent),
}

impl HandleError {
    /// Recover the rejected event.
    pub fn into_event(self) -> LogEvent {
        match self {
            HandleError::QueueFull(event) | HandleError::Closed(event) => event,
        }
    }
}

/// Handle to an adapter running on its own worker thread.
pub struct AdapterHandle {
    tx: Option<Sender<LogEvent>>,
    handle: Mutex<Option<thread::JoinHandle<StreamSummary>>>,
    warner: RateLimitedWarner,
}

impl AdapterHandle {
    /// Run `adapter` on a new thread fed through a channel of `capacity`.
    pub fn spawn<A>(mut adapter: A, config: &ForwarderConfig) -> Self
    where
        A: LogAdapter + 'static,
    {
        let (tx, rx): (Sender<LogEvent>, Receiver<LogEvent>) = bounded(config.capacity);
        let handle = thread::spawn(move || adapter.stream(&mut rx.into_iter()));
        Self {
            tx: Some(tx),
            handle: Mutex::new(Some(handle)),
            warner: RateLimitedWarner::new(config.warn_interval),
        }
    }

    /// Queue `event` without blocking. A rejected event is returned inside
    /// the error; rejections are reported through rate-limited warnings.
    pub fn send(&self, event: LogEvent) -> Result<(), HandleError> {
        let Some(tx) = self.tx.as_ref() else {
            self.warn_rejected("after shutdown");
            return Err(HandleError::Closed(event));
        };
        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                self.warn_rejected("queue full");
                Err(HandleError::QueueFull(event))
            }
            Err(TrySendError::Disconnected(event)) => {
                self.warn_rejected("worker disconnected");
                Err(HandleError::Closed(event))
            }
        }
    }

    /// Queue `event`, waiting for room while the queue is full.
    pub fn send_blocking(&self, event: LogEvent) -> Result<(), HandleError> {
        let Some(tx) = self.tx.as_ref() else {
            self.warn_rejected("after shutdown");
            return Err(HandleError::Closed(event));
        };
        tx.send(event).map_err(|SendError(event)| {
            self.warn_rejected("worker disconnected");
            HandleError::Closed(event)
        })
    }

    /// Stop accepting events, let the worker drain the queue, and return
    /// its summary. Returns `None` when already closed or the worker
    /// panicked.
    pub fn close(&mut self) -> Option<StreamSummary> {
        self.tx.take();
        self.warner.flush(|count| {
            warn!("FluentdAdapter rejected {count} events before close");
        });
        let handle = self.handle.lock().take()?;
        match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                warn!("FluentdAdapter: worker thread panicked");
                None
            }
        }
    }

    fn warn_rejected(&self, reason: &str) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("FluentdAdapter rejected {count} events; {reason}");
        });
    }
}

impl Drop for AdapterHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("open", &self.tx.is_some())
            .finish()
    }
}
