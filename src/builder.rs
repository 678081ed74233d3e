//! Builder for [`FluentdAdapter`](crate::forward::FluentdAdapter).
//!
//! Exposes collector selection, timeout tuning, TLS configuration, payload
//! format, and retry parameters. Validation happens once in
//! [`ForwarderBuilder::build_config`] so the adapter never sees a zero
//! timeout or an empty host.

use std::time::Duration;

use thiserror::Error;

use crate::forward::{
    ConnectError, FluentdAdapter, ForwarderConfig, PayloadFormat, TcpEndpoint, TlsOptions,
};

/// Errors that may occur while building an adapter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    /// The initial connection to the collector failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

#[derive(Clone, Debug, Default)]
struct TlsConfig {
    domain: Option<String>,
    insecure: bool,
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`FluentdAdapter`] instances over TCP.
#[derive(Clone, Debug)]
pub struct ForwarderBuilder {
    base: ForwarderConfig,
    host: Option<String>,
    port: u16,
    tls: Option<TlsConfig>,
    capacity: Option<usize>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    max_payload_size: Option<usize>,
    retry_count: Option<u32>,
    base_delay_ms: Option<u64>,
    format: Option<PayloadFormat>,
}

impl Default for ForwarderBuilder {
    fn default() -> Self {
        Self::from_config(ForwarderConfig::default())
    }
}

impl ForwarderBuilder {
    /// Create a new builder with no collector configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, for instance one read with
    /// [`ForwarderConfig::from_env`].
    pub fn from_config(base: ForwarderConfig) -> Self {
        Self {
            base,
            host: None,
            port: 24224,
            tls: None,
            capacity: None,
            connect_timeout_ms: None,
            write_timeout_ms: None,
            max_payload_size: None,
            retry_count: None,
            base_delay_ms: None,
            format: None,
        }
    }

    /// Target a collector over TCP.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    /// Configure TLS using the provided domain and validation policy.
    pub fn with_tls(mut self, domain: Option<String>, insecure: bool) -> Self {
        self.tls = Some(TlsConfig { domain, insecure });
        self
    }

    option_setter!(
        #[doc = "Set the bounded channel capacity used by spawned adapters."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_max_payload_size, max_payload_size, usize);
    option_setter!(
        #[doc = "Set the retry count for write retries and reconnects."]
        with_retry_count,
        retry_count,
        u32
    );
    option_setter!(with_base_delay_ms, base_delay_ms, u64);
    option_setter!(with_format, format, PayloadFormat);

    fn validate(&self) -> Result<(), BuildError> {
        match &self.host {
            None => {
                return Err(BuildError::InvalidConfig(
                    "adapter requires a collector host".into(),
                ));
            }
            Some(host) if host.trim().is_empty() => {
                return Err(BuildError::InvalidConfig(
                    "tcp host must not be empty".into(),
                ));
            }
            Some(_) => {}
        }
        ensure_positive!(self.port, "port")?;
        if let Some(capacity) = self.capacity {
            ensure_positive!(capacity, "capacity")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        if let Some(size) = self.max_payload_size {
            ensure_positive!(size, "max_payload_size")?;
        }
        Ok(())
    }

    /// Validate and produce the adapter configuration.
    pub fn build_config(&self) -> Result<ForwarderConfig, BuildError> {
        self.validate()?;
        let mut config = self.base.clone();
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(size) = self.max_payload_size {
            config.max_payload_size = size;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(count) = self.retry_count {
            config.retry.max_retries = count;
        }
        if let Some(ms) = self.base_delay_ms {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Validate and produce the collector endpoint.
    pub fn build_endpoint(&self) -> Result<TcpEndpoint, BuildError> {
        self.validate()?;
        let host = self.host.as_deref().unwrap_or_default();
        let address = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        };
        let mut endpoint = TcpEndpoint::new(address);
        if let Some(ms) = self.connect_timeout_ms {
            endpoint.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.write_timeout_ms {
            endpoint.write_timeout = Duration::from_millis(ms);
        }
        if let Some(tls) = &self.tls {
            endpoint.tls = Some(TlsOptions {
                domain: tls.domain.clone().unwrap_or_else(|| host.to_owned()),
                insecure_skip_verify: tls.insecure,
            });
        }
        Ok(endpoint)
    }

    /// Connect to the collector and return a ready adapter.
    pub fn connect(&self) -> Result<FluentdAdapter<TcpEndpoint>, BuildError> {
        let config = self.build_config()?;
        let endpoint = self.build_endpoint()?;
        Ok(FluentdAdapter::open(endpoint, &config)?)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn builder_requires_host() {
        let err = ForwarderBuilder::new()
            .build_config()
            .expect_err("host must be required");
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains("host")));
    }

    #[rstest]
    fn builder_rejects_blank_host() {
        let err = ForwarderBuilder::new()
            .with_tcp("  ", 24224)
            .build_endpoint()
            .expect_err("blank host must fail");
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains("empty")));
    }

    #[rstest]
    #[case(ForwarderBuilder::new().with_tcp("h", 1).with_capacity(0), "capacity")]
    #[case(ForwarderBuilder::new().with_tcp("h", 1).with_connect_timeout_ms(0), "connect_timeout_ms")]
    #[case(ForwarderBuilder::new().with_tcp("h", 1).with_write_timeout_ms(0), "write_timeout_ms")]
    #[case(ForwarderBuilder::new().with_tcp("h", 1).with_max_payload_size(0), "max_payload_size")]
    #[case(ForwarderBuilder::new().with_tcp("h", 0), "port")]
    fn builder_rejects_zero_values(#[case] builder: ForwarderBuilder, #[case] field: &str) {
        let err = builder.build_config().expect_err("zero value must fail");
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains(field)));
    }

    #[rstest]
    fn builder_applies_overrides() {
        let builder = ForwarderBuilder::new()
            .with_tcp("collector", 24225)
            .with_retry_count(3)
            .with_base_delay_ms(1)
            .with_format(PayloadFormat::Json)
            .with_write_timeout_ms(200)
            .with_tls(None, true);
        let config = builder.build_config().unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1));
        assert_eq!(config.format, PayloadFormat::Json);

        let endpoint = builder.build_endpoint().unwrap();
        assert_eq!(endpoint.address, "collector:24225");
        assert_eq!(endpoint.write_timeout, Duration::from_millis(200));
        let tls = endpoint.tls.expect("tls configured");
        assert_eq!(tls.domain, "collector");
        assert!(tls.insecure_skip_verify);
    }

    #[rstest]
    fn builder_brackets_ipv6_hosts() {
        let endpoint = ForwarderBuilder::new()
            .with_tcp("::1", 24224)
            .build_endpoint()
            .unwrap();
        assert_eq!(endpoint.address, "[::1]:24224");
    }
}
