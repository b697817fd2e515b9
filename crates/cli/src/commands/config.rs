use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sitescope_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in effective_values(&config) {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

/// Every user-facing setting with its rendered value and environment override. Secrets
/// only ever render as `<redacted>` or `<unset>`.
fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, &'static str)> {
    let api_token = if config.site_lifecycle.api_token.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        ("database.url", config.database.url.clone(), "SITESCOPE_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "SITESCOPE_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "SITESCOPE_DATABASE_TIMEOUT_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "SITESCOPE_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "SITESCOPE_SERVER_PORT"),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "SITESCOPE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        (
            "workflow.storage_timeout_ms",
            config.workflow.storage_timeout_ms.to_string(),
            "SITESCOPE_WORKFLOW_STORAGE_TIMEOUT_MS",
        ),
        (
            "workflow.lifecycle_timeout_ms",
            config.workflow.lifecycle_timeout_ms.to_string(),
            "SITESCOPE_WORKFLOW_LIFECYCLE_TIMEOUT_MS",
        ),
        (
            "workflow.dashboard_activity_limit",
            config.workflow.dashboard_activity_limit.to_string(),
            "SITESCOPE_WORKFLOW_DASHBOARD_ACTIVITY_LIMIT",
        ),
        (
            "site_lifecycle.enabled",
            config.site_lifecycle.enabled.to_string(),
            "SITESCOPE_SITE_LIFECYCLE_ENABLED",
        ),
        (
            "site_lifecycle.base_url",
            config.site_lifecycle.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "SITESCOPE_SITE_LIFECYCLE_BASE_URL",
        ),
        ("site_lifecycle.api_token", api_token.to_string(), "SITESCOPE_SITE_LIFECYCLE_API_TOKEN"),
        ("logging.level", config.logging.level.clone(), "SITESCOPE_LOGGING_LEVEL"),
        ("logging.format", config.logging.format.as_str().to_string(), "SITESCOPE_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("sitescope.toml"), PathBuf::from("config/sitescope.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
