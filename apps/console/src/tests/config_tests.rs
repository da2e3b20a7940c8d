use std::env;

use crate::config::{apply_env, apply_file, Settings};

#[test]
fn defaults_point_at_local_backend() {
    let settings = Settings::default();
    assert_eq!(settings.server_url, "http://localhost:8000");
    assert_eq!(settings.max_reconnect_attempts, 5);
    assert_eq!(settings.base_backoff_ms, 1000);
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        "server_url = \"http://bench-rack:9000\"\nmax_reconnect_attempts = 8\n",
    );
    assert_eq!(settings.server_url, "http://bench-rack:9000");
    assert_eq!(settings.max_reconnect_attempts, 8);
    assert_eq!(settings.base_backoff_ms, 1000, "untouched keys keep defaults");
}

#[test]
fn unparseable_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "not valid toml [");
    assert_eq!(settings, Settings::default());
}

#[test]
fn environment_overrides_file_values() {
    // The only test that mutates the process environment, so parallel
    // test runs cannot interfere with each other.
    env::set_var("BENCHLINK_SERVER_URL", "http://lab:8000");
    env::set_var("BENCHLINK_MAX_RECONNECT_ATTEMPTS", "2");
    env::set_var("BENCHLINK_BASE_BACKOFF_MS", "250");

    let mut settings = Settings::default();
    apply_file(&mut settings, "server_url = \"http://from-file:1\"\n");
    apply_env(&mut settings);

    assert_eq!(settings.server_url, "http://lab:8000");
    assert_eq!(settings.max_reconnect_attempts, 2);
    assert_eq!(settings.base_backoff_ms, 250);

    // Malformed numbers are ignored and leave the previous value alone.
    env::set_var("BENCHLINK_MAX_RECONNECT_ATTEMPTS", "lots");
    let mut settings = Settings::default();
    apply_env(&mut settings);
    assert_eq!(settings.max_reconnect_attempts, 5);

    env::remove_var("BENCHLINK_SERVER_URL");
    env::remove_var("BENCHLINK_MAX_RECONNECT_ATTEMPTS");
    env::remove_var("BENCHLINK_BASE_BACKOFF_MS");
}
