//! Console settings: defaults, then `console.toml`, then environment.

use std::{collections::HashMap, env, fs};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub max_reconnect_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".into(),
            max_reconnect_attempts: 5,
            base_backoff_ms: 1000,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string("console.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings);
    settings
}

pub(crate) fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("server_url").and_then(|v| v.as_str()) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("max_reconnect_attempts")
        .and_then(|v| v.as_integer())
    {
        settings.max_reconnect_attempts = v.max(0) as u32;
    }
    if let Some(v) = file_cfg.get("base_backoff_ms").and_then(|v| v.as_integer()) {
        settings.base_backoff_ms = v.max(0) as u64;
    }
}

pub(crate) fn apply_env(settings: &mut Settings) {
    if let Ok(v) = env::var("BENCHLINK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = env::var("BENCHLINK_MAX_RECONNECT_ATTEMPTS") {
        if let Ok(n) = v.parse() {
            settings.max_reconnect_attempts = n;
        }
    }
    if let Ok(v) = env::var("BENCHLINK_BASE_BACKOFF_MS") {
        if let Ok(n) = v.parse() {
            settings.base_backoff_ms = n;
        }
    }
}
