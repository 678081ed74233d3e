//! Delivery state machine: write, retry on the same connection, reconnect.

use std::{io, thread, time::Duration};

use log::{info, warn};
use thiserror::Error;

use super::{
    envelope::EncodedPayload,
    retry::RetryPolicy,
    transport::{Connection, Connector, WriteError},
};

/// Failure to establish the initial connection.
#[derive(Debug, Error)]
#[error("unable to connect to {endpoint}: {source}")]
pub struct ConnectError {
    pub endpoint: String,
    #[source]
    pub source: io::Error,
}

/// A payload could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No new connection could be established; the broken one stays in place.
    #[error("reconnect failed after {attempts} attempts: {source}")]
    ReconnectExhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },
    /// Reconnected, but the single write on the new connection failed.
    #[error("write after reconnect failed: {0}")]
    WriteAfterReconnect(#[source] WriteError),
}

/// Owns the collector connection and recovers it on failure.
///
/// Every call to [`deliver`](Self::deliver) starts from a plain write on the
/// current connection, so a failed delivery never leaves the transport in a
/// state that refuses later payloads.
pub struct ResilientTransport<C: Connector> {
    connector: C,
    connection: C::Connection,
    policy: RetryPolicy,
    sleep: fn(Duration),
}

impl<C: Connector> ResilientTransport<C> {
    /// Make a single connection attempt; failure is not retried.
    pub fn open(connector: C, policy: RetryPolicy) -> Result<Self, ConnectError> {
        let connection = connector.connect().map_err(|source| ConnectError {
            endpoint: connector.endpoint(),
            source,
        })?;
        info!("ResilientTransport connected to {}", connector.endpoint());
        Ok(Self {
            connector,
            connection,
            policy,
            sleep: thread::sleep,
        })
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Deliver `payload`, retrying and reconnecting as needed.
    pub fn deliver(&mut self, payload: EncodedPayload) -> Result<(), DeliveryError> {
        let bytes = payload.as_bytes();
        let err = match self.connection.send(bytes) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!("ResilientTransport write failed: {err}");

        if err.is_transient() && self.retry_write(bytes).is_ok() {
            return Ok(());
        }

        self.reconnect()?;
        match self.connection.send(bytes) {
            Ok(()) => {
                info!("ResilientTransport reconnect successful");
                Ok(())
            }
            Err(err) => {
                warn!("ResilientTransport write after reconnect failed: {err}");
                Err(DeliveryError::WriteAfterReconnect(err))
            }
        }
    }

    fn retry_write(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        info!(
            "ResilientTransport retrying write up to {} times",
            self.policy.max_retries
        );
        let connection = &mut self.connection;
        let result = self
            .policy
            .retry_with_sleep(self.sleep, || connection.send(bytes));
        match &result {
            Ok(()) => info!("ResilientTransport retry successful"),
            Err(err) => warn!("ResilientTransport retry failed: {err}"),
        }
        result
    }

    fn reconnect(&mut self) -> Result<(), DeliveryError> {
        info!(
            "ResilientTransport reconnecting to {} up to {} times",
            self.connector.endpoint(),
            self.policy.max_retries
        );
        let connector = &self.connector;
        match self
            .policy
            .retry_with_sleep(self.sleep, || connector.connect())
        {
            Ok(connection) => {
                self.connection = connection;
                Ok(())
            }
            Err(source) => {
                warn!("ResilientTransport reconnect failed: {source}");
                Err(DeliveryError::ReconnectExhausted {
                    attempts: self.policy.max_attempts(),
                    source,
                })
            }
        }
    }
}
