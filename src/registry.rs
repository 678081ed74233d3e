//! Adapter and transport registries.
//!
//! A host instantiates outputs from routes such as `fluentd-tcp://collector:24224`.
//! [`AdapterRegistry`] maps the adapter scheme to a factory and
//! [`TransportRegistry`] supplies the dial capability named by the scheme's
//! transport suffix.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::Arc,
};

use thiserror::Error;

use crate::forward::{
    ActiveConnection, ConnectError, Connector, FluentdAdapter, ForwarderConfig, LogAdapter,
    PayloadFormat, TcpEndpoint, transport::connect_endpoint,
};

/// Scheme under which the Fluentd adapter registers itself.
pub const FLUENTD_TCP_SCHEME: &str = "fluentd-tcp";
/// Transport used when a route's adapter name carries no suffix.
pub const DEFAULT_TRANSPORT: &str = "tcp";

/// Options attached to a route, e.g. parsed from a query string.
pub type RouteOptions = BTreeMap<String, String>;

/// Destination for one adapter instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Route {
    /// Adapter scheme, e.g. `fluentd-tcp`.
    pub adapter: String,
    /// Collector address as `host:port`.
    pub address: String,
    pub options: RouteOptions,
}

impl Route {
    pub fn new(adapter: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            address: address.into(),
            options: RouteOptions::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Transport named by the adapter scheme suffix (`fluentd-tls` → `tls`),
    /// or `default` when there is none.
    pub fn adapter_transport<'a>(&'a self, default: &'a str) -> &'a str {
        match self.adapter.rsplit_once('-') {
            Some((_, transport)) if !transport.is_empty() => transport,
            _ => default,
        }
    }
}

/// Errors raised while instantiating an adapter for a route.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no adapter registered for scheme {0:?}")]
    UnknownAdapter(String),
    #[error("unable to find transport for adapter {0:?}")]
    UnknownTransport(String),
    #[error("invalid route option: {0}")]
    InvalidOption(String),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Dial-by-address-and-options capability.
pub trait AdapterTransport: Send + Sync {
    fn dial(&self, address: &str, options: &RouteOptions) -> io::Result<ActiveConnection>;
}

/// Plain TCP dialer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer;

/// TCP dialer completing a TLS handshake.
#[derive(Clone, Copy, Debug, Default)]
pub struct TlsDialer;

impl AdapterTransport for TcpDialer {
    fn dial(&self, address: &str, options: &RouteOptions) -> io::Result<ActiveConnection> {
        connect_endpoint(&TcpEndpoint::from_options(address, options, false)?)
    }
}

impl AdapterTransport for TlsDialer {
    fn dial(&self, address: &str, options: &RouteOptions) -> io::Result<ActiveConnection> {
        connect_endpoint(&TcpEndpoint::from_options(address, options, true)?)
    }
}

/// Named transports available to adapter factories.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn AdapterTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `tcp` and `tls` transports.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("tcp", Arc::new(TcpDialer));
        registry.register("tls", Arc::new(TlsDialer));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, transport: Arc<dyn AdapterTransport>) {
        self.transports.insert(name.into(), transport);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn AdapterTransport>> {
        self.transports.get(name).cloned()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.transports.keys().collect();
        names.sort();
        f.debug_struct("TransportRegistry")
            .field("transports", &names)
            .finish()
    }
}

/// Connector dialing a route through a registered transport.
#[derive(Clone)]
pub struct RouteConnector {
    transport: Arc<dyn AdapterTransport>,
    address: String,
    options: RouteOptions,
}

impl RouteConnector {
    pub fn new(transport: Arc<dyn AdapterTransport>, route: &Route) -> Self {
        Self {
            transport,
            address: route.address.clone(),
            options: route.options.clone(),
        }
    }
}

impl Connector for RouteConnector {
    type Connection = ActiveConnection;

    fn connect(&self) -> io::Result<ActiveConnection> {
        self.transport.dial(&self.address, &self.options)
    }

    fn endpoint(&self) -> String {
        self.address.clone()
    }
}

/// Signature shared by adapter factories.
pub type AdapterFactory =
    fn(&Route, &TransportRegistry, &ForwarderConfig) -> Result<Box<dyn LogAdapter>, FactoryError>;

/// Adapter factories keyed by scheme.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Fluentd adapter registered as `fluentd-tcp`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(FLUENTD_TCP_SCHEME, new_fluentd_adapter);
        registry
    }

    pub fn register(&mut self, scheme: impl Into<String>, factory: AdapterFactory) {
        self.factories.insert(scheme.into(), factory);
    }

    pub fn lookup(&self, scheme: &str) -> Option<AdapterFactory> {
        self.factories.get(scheme).copied()
    }

    /// Instantiate the adapter registered for `route.adapter`.
    pub fn create(
        &self,
        route: &Route,
        transports: &TransportRegistry,
        config: &ForwarderConfig,
    ) -> Result<Box<dyn LogAdapter>, FactoryError> {
        let factory = self
            .lookup(&route.adapter)
            .ok_or_else(|| FactoryError::UnknownAdapter(route.adapter.clone()))?;
        factory(route, transports, config)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.factories.keys().collect();
        schemes.sort();
        f.debug_struct("AdapterRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

/// Factory for the Fluentd adapter. Connects once; a failed first connection
/// is returned to the caller.
pub fn new_fluentd_adapter(
    route: &Route,
    transports: &TransportRegistry,
    config: &ForwarderConfig,
) -> Result<Box<dyn LogAdapter>, FactoryError> {
    let transport_name = route.adapter_transport(DEFAULT_TRANSPORT);
    let transport = transports
        .lookup(transport_name)
        .ok_or_else(|| FactoryError::UnknownTransport(route.adapter.clone()))?;
    TcpEndpoint::from_options(&route.address, &route.options, transport_name == "tls")
        .map_err(|err| FactoryError::InvalidOption(err.to_string()))?;
    let mut config = config.clone();
    if let Some(raw) = route.options.get("format") {
        config.format = PayloadFormat::parse(raw)
            .ok_or_else(|| FactoryError::InvalidOption(format!("format {raw:?}")))?;
    }
    let adapter = FluentdAdapter::open(RouteConnector::new(transport, route), &config)?;
    Ok(Box::new(adapter))
}
