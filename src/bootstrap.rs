//! Environment-driven setup for hosts embedding the adapter.

use log::{LevelFilter, debug};

use crate::{
    forward::{ForwarderConfig, LogAdapter},
    registry::{AdapterRegistry, FactoryError, Route, TransportRegistry},
};

/// Read the adapter configuration from the environment and, when `DEBUG` is
/// set, raise the `log` facade's maximum level so debug diagnostics reach the
/// host's logger.
pub fn init_from_env() -> ForwarderConfig {
    let config = ForwarderConfig::from_env();
    apply_log_level(&config);
    debug!(
        "FluentdAdapter: retry count set to {}",
        config.retry.max_retries
    );
    config
}

/// Raise the maximum log level to `Debug` when `config.debug` is set. A
/// level already more verbose than `Debug` is left alone.
pub fn apply_log_level(config: &ForwarderConfig) {
    if config.debug && log::max_level() < LevelFilter::Debug {
        log::set_max_level(LevelFilter::Debug);
    }
}

/// Instantiate the adapter for `route` using the default registries and the
/// environment configuration.
pub fn adapter_for_route(route: &Route) -> Result<Box<dyn LogAdapter>, FactoryError> {
    let config = init_from_env();
    AdapterRegistry::with_defaults().create(route, &TransportRegistry::with_defaults(), &config)
}
