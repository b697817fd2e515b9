use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub site_lifecycle: SiteLifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub storage_timeout_ms: u64,
    pub lifecycle_timeout_ms: u64,
    pub dashboard_activity_limit: u32,
}

impl WorkflowConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_ms)
    }
}

#[derive(Clone, Debug)]
pub struct SiteLifecycleConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub site_lifecycle_enabled: Option<bool>,
    pub site_lifecycle_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://sitescope.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig {
                storage_timeout_ms: 5_000,
                lifecycle_timeout_ms: 3_000,
                dashboard_activity_limit: 20,
            },
            site_lifecycle: SiteLifecycleConfig { enabled: false, base_url: None, api_token: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("sitescope.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(storage_timeout_ms) = workflow.storage_timeout_ms {
                self.workflow.storage_timeout_ms = storage_timeout_ms;
            }
            if let Some(lifecycle_timeout_ms) = workflow.lifecycle_timeout_ms {
                self.workflow.lifecycle_timeout_ms = lifecycle_timeout_ms;
            }
            if let Some(dashboard_activity_limit) = workflow.dashboard_activity_limit {
                self.workflow.dashboard_activity_limit = dashboard_activity_limit;
            }
        }

        if let Some(site_lifecycle) = patch.site_lifecycle {
            if let Some(enabled) = site_lifecycle.enabled {
                self.site_lifecycle.enabled = enabled;
            }
            if let Some(base_url) = site_lifecycle.base_url {
                self.site_lifecycle.base_url = Some(base_url);
            }
            if let Some(api_token) = site_lifecycle.api_token {
                self.site_lifecycle.api_token = Some(SecretString::from(api_token));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SITESCOPE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SITESCOPE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SITESCOPE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SITESCOPE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SITESCOPE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SITESCOPE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SITESCOPE_SERVER_PORT") {
            self.server.port = parse_u16("SITESCOPE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SITESCOPE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SITESCOPE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SITESCOPE_WORKFLOW_STORAGE_TIMEOUT_MS") {
            self.workflow.storage_timeout_ms =
                parse_u64("SITESCOPE_WORKFLOW_STORAGE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("SITESCOPE_WORKFLOW_LIFECYCLE_TIMEOUT_MS") {
            self.workflow.lifecycle_timeout_ms =
                parse_u64("SITESCOPE_WORKFLOW_LIFECYCLE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("SITESCOPE_WORKFLOW_DASHBOARD_ACTIVITY_LIMIT") {
            self.workflow.dashboard_activity_limit =
                parse_u32("SITESCOPE_WORKFLOW_DASHBOARD_ACTIVITY_LIMIT", &value)?;
        }

        if let Some(value) = read_env("SITESCOPE_SITE_LIFECYCLE_ENABLED") {
            self.site_lifecycle.enabled = parse_bool("SITESCOPE_SITE_LIFECYCLE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SITESCOPE_SITE_LIFECYCLE_BASE_URL") {
            self.site_lifecycle.base_url = Some(value);
        }
        if let Some(value) = read_env("SITESCOPE_SITE_LIFECYCLE_API_TOKEN") {
            self.site_lifecycle.api_token = Some(SecretString::from(value));
        }

        let log_level =
            read_env("SITESCOPE_LOGGING_LEVEL").or_else(|| read_env("SITESCOPE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SITESCOPE_LOGGING_FORMAT").or_else(|| read_env("SITESCOPE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.site_lifecycle_enabled {
            self.site_lifecycle.enabled = enabled;
        }
        if let Some(base_url) = overrides.site_lifecycle_base_url {
            self.site_lifecycle.base_url = Some(base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_site_lifecycle(&self.site_lifecycle)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sitescope.toml"), PathBuf::from("config/sitescope.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.storage_timeout_ms == 0 || workflow.storage_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "workflow.storage_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if workflow.lifecycle_timeout_ms == 0 || workflow.lifecycle_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "workflow.lifecycle_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if workflow.dashboard_activity_limit == 0 || workflow.dashboard_activity_limit > 500 {
        return Err(ConfigError::Validation(
            "workflow.dashboard_activity_limit must be in range 1..=500".to_string(),
        ));
    }

    Ok(())
}

fn validate_site_lifecycle(site_lifecycle: &SiteLifecycleConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &site_lifecycle.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "site_lifecycle.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if site_lifecycle.enabled {
        let missing_url = site_lifecycle
            .base_url
            .as_ref()
            .map(|value| value.trim().is_empty())
            .unwrap_or(true);
        if missing_url {
            return Err(ConfigError::Validation(
                "site_lifecycle.enabled is true but site_lifecycle.base_url is not set".to_string(),
            ));
        }

        let blank_token = site_lifecycle
            .api_token
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_token {
            return Err(ConfigError::Validation(
                "site_lifecycle.api_token must not be blank when provided".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    site_lifecycle: Option<SiteLifecyclePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    storage_timeout_ms: Option<u64>,
    lifecycle_timeout_ms: Option<u64>,
    dashboard_activity_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SiteLifecyclePatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.site_lifecycle.enabled, "site lifecycle should default to disabled")?;
        ensure(
            config.workflow.storage_timeout() == Duration::from_millis(5_000),
            "storage timeout should default to five seconds",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SITESCOPE_LIFECYCLE_TOKEN", "lifecycle-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sitescope.toml");
            fs::write(
                &path,
                r#"
[site_lifecycle]
enabled = true
base_url = "https://sites.internal"
api_token = "${TEST_SITESCOPE_LIFECYCLE_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .site_lifecycle
                    .api_token
                    .as_ref()
                    .map(|token| token.expose_secret() == "lifecycle-from-env")
                    .unwrap_or(false),
                "lifecycle token should be loaded from environment",
            )?;
            ensure(config.site_lifecycle.enabled, "lifecycle client should be enabled from file")
        })();

        clear_vars(&["TEST_SITESCOPE_LIFECYCLE_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITESCOPE_LOG_LEVEL", "warn");
        env::set_var("SITESCOPE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["SITESCOPE_LOG_LEVEL", "SITESCOPE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITESCOPE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SITESCOPE_WORKFLOW_STORAGE_TIMEOUT_MS", "750");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sitescope.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[workflow]
storage_timeout_ms = 250
dashboard_activity_limit = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.workflow.storage_timeout_ms == 750,
                "env storage timeout should win over file and defaults",
            )?;
            ensure(
                config.workflow.dashboard_activity_limit == 5,
                "file activity limit should win over defaults",
            )
        })();

        clear_vars(&["SITESCOPE_DATABASE_URL", "SITESCOPE_WORKFLOW_STORAGE_TIMEOUT_MS"]);
        result
    }

    #[test]
    fn enabled_lifecycle_without_base_url_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITESCOPE_SITE_LIFECYCLE_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("site_lifecycle.base_url")
            );
            ensure(has_message, "validation failure should mention site_lifecycle.base_url")
        })();

        clear_vars(&["SITESCOPE_SITE_LIFECYCLE_ENABLED"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITESCOPE_SERVER_PORT", "not-a-port");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "SITESCOPE_SERVER_PORT", "error should name the offending key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid env override".to_string()),
        };

        clear_vars(&["SITESCOPE_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITESCOPE_SITE_LIFECYCLE_API_TOKEN", "lifecycle-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("lifecycle-secret-value"),
                "debug output should not contain lifecycle token",
            )
        })();

        clear_vars(&["SITESCOPE_SITE_LIFECYCLE_API_TOKEN"]);
        result
    }
}
