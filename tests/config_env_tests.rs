//! Environment-driven configuration. These tests mutate process-wide
//! variables and therefore run serially.

use std::env;

use fluentd_forward::{ForwarderConfig, bootstrap, forward::config::DEFAULT_RETRY_COUNT};
use rstest::rstest;
use serial_test::serial;

fn set(key: &str, value: Option<&str>) {
    // SAFETY: every test touching the environment is marked `#[serial]`.
    unsafe {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}

#[rstest]
#[serial]
fn defaults_without_environment() {
    set("RETRY_COUNT", None);
    set("DEBUG", None);
    let config = ForwarderConfig::from_env();
    assert_eq!(config.retry.max_retries, DEFAULT_RETRY_COUNT);
    assert!(!config.debug);
}

#[rstest]
#[case("0", 0)]
#[case("25", 25)]
#[case("not-a-number", DEFAULT_RETRY_COUNT)]
#[serial]
fn retry_count_is_read_from_environment(#[case] raw: &str, #[case] expected: u32) {
    set("RETRY_COUNT", Some(raw));
    let config = ForwarderConfig::from_env();
    set("RETRY_COUNT", None);
    assert_eq!(config.retry.max_retries, expected);
}

#[rstest]
#[serial]
fn debug_raises_log_level() {
    set("DEBUG", Some("1"));
    log::set_max_level(log::LevelFilter::Info);
    let config = bootstrap::init_from_env();
    set("DEBUG", None);
    assert!(config.debug);
    assert_eq!(log::max_level(), log::LevelFilter::Debug);
}

#[rstest]
#[serial]
fn empty_debug_value_is_ignored() {
    set("DEBUG", Some(""));
    let config = ForwarderConfig::from_env();
    set("DEBUG", None);
    assert!(!config.debug);
}
