use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound imposed by Slack on the slash-command acknowledgement.
pub const SLACK_RESPONSE_DEADLINE_MS: u64 = 2_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub broker: BrokerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub signing_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub addresses: Vec<String>,
    pub cluster_id: Option<String>,
    pub topic: String,
    pub publish_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub broker_addresses: Option<Vec<String>>,
    pub broker_topic: Option<String>,
    pub broker_publish_timeout_ms: Option<u64>,
    pub server_port: Option<u16>,
    pub health_check_port: Option<u16>,
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
                url: "sqlite://coffeebuddy.db".to_string(),
                max_connections: 20,
                timeout_secs: 30,
            },
            slack: SlackConfig { signing_secret: String::new().into() },
            broker: BrokerConfig {
                addresses: vec!["http://localhost:8082".to_string()],
                cluster_id: None,
                topic: "slack.events".to_string(),
                publish_timeout_ms: 300,
                request_timeout_ms: 250,
                max_retries: 2,
                retry_base_delay_ms: 25,
                retry_max_delay_ms: 200,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                health_check_port: 8081,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
                options.config_path.unwrap_or_else(|| PathBuf::from("coffeebuddy.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.broker.addresses = normalize_addresses(&config.broker.addresses);
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

        if let Some(slack) = patch.slack {
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
        }

        if let Some(broker) = patch.broker {
            if let Some(addresses) = broker.addresses {
                self.broker.addresses = addresses;
            }
            if let Some(cluster_id) = broker.cluster_id {
                self.broker.cluster_id = Some(cluster_id);
            }
            if let Some(topic) = broker.topic {
                self.broker.topic = topic;
            }
            if let Some(publish_timeout_ms) = broker.publish_timeout_ms {
                self.broker.publish_timeout_ms = publish_timeout_ms;
            }
            if let Some(request_timeout_ms) = broker.request_timeout_ms {
                self.broker.request_timeout_ms = request_timeout_ms;
            }
            if let Some(max_retries) = broker.max_retries {
                self.broker.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = broker.retry_base_delay_ms {
                self.broker.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_max_delay_ms) = broker.retry_max_delay_ms {
                self.broker.retry_max_delay_ms = retry_max_delay_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env_with_fallback("COFFEEBUDDY_DATABASE_URL", "DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COFFEEBUDDY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("COFFEEBUDDY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("COFFEEBUDDY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) =
            read_env_with_fallback("COFFEEBUDDY_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET")
        {
            self.slack.signing_secret = secret_value(value);
        }

        if let Some(value) = read_env_with_fallback("COFFEEBUDDY_BROKER_ADDRESSES", "KAFKA_BROKERS")
        {
            self.broker.addresses = split_list(&value);
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_CLUSTER_ID") {
            self.broker.cluster_id = Some(value);
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_TOPIC") {
            self.broker.topic = value;
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_PUBLISH_TIMEOUT_MS") {
            self.broker.publish_timeout_ms =
                parse_u64("COFFEEBUDDY_BROKER_PUBLISH_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_REQUEST_TIMEOUT_MS") {
            self.broker.request_timeout_ms =
                parse_u64("COFFEEBUDDY_BROKER_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_MAX_RETRIES") {
            self.broker.max_retries = parse_u32("COFFEEBUDDY_BROKER_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_RETRY_BASE_DELAY_MS") {
            self.broker.retry_base_delay_ms =
                parse_u64("COFFEEBUDDY_BROKER_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_BROKER_RETRY_MAX_DELAY_MS") {
            self.broker.retry_max_delay_ms =
                parse_u64("COFFEEBUDDY_BROKER_RETRY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("COFFEEBUDDY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COFFEEBUDDY_SERVER_PORT") {
            self.server.port = parse_u16("COFFEEBUDDY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("COFFEEBUDDY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("COFFEEBUDDY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("COFFEEBUDDY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("COFFEEBUDDY_LOGGING_LEVEL")
            .or_else(|| read_env("COFFEEBUDDY_LOG_LEVEL"))
            .or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value.to_ascii_lowercase();
        }
        let log_format =
            read_env("COFFEEBUDDY_LOGGING_FORMAT").or_else(|| read_env("COFFEEBUDDY_LOG_FORMAT"));
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
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(addresses) = overrides.broker_addresses {
            self.broker.addresses = addresses;
        }
        if let Some(topic) = overrides.broker_topic {
            self.broker.topic = topic;
        }
        if let Some(publish_timeout_ms) = overrides.broker_publish_timeout_ms {
            self.broker.publish_timeout_ms = publish_timeout_ms;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(health_check_port) = overrides.health_check_port {
            self.server.health_check_port = health_check_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_broker(&self.broker)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("coffeebuddy.toml"), PathBuf::from("config/coffeebuddy.toml")]
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

/// Bare `host:port` entries (the shape `KAFKA_BROKERS` usually carries) are
/// treated as plain-http REST proxy endpoints.
fn normalize_addresses(addresses: &[String]) -> Vec<String> {
    addresses
        .iter()
        .map(|address| address.trim().trim_end_matches('/'))
        .filter(|address| !address.is_empty())
        .map(|address| {
            if address.contains("://") {
                address.to_string()
            } else {
                format!("http://{address}")
            }
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|part| !part.is_empty()).map(str::to_string).collect()
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App Credentials".to_string()
        ));
    }

    Ok(())
}

fn validate_broker(broker: &BrokerConfig) -> Result<(), ConfigError> {
    if broker.addresses.is_empty() {
        return Err(ConfigError::Validation(
            "broker.addresses must list at least one REST proxy address".to_string(),
        ));
    }

    if let Some(address) = broker
        .addresses
        .iter()
        .find(|address| !address.starts_with("http://") && !address.starts_with("https://"))
    {
        return Err(ConfigError::Validation(format!(
            "broker address `{address}` must start with http:// or https://"
        )));
    }

    if broker.topic.trim().is_empty() {
        return Err(ConfigError::Validation("broker.topic must not be empty".to_string()));
    }

    if broker.publish_timeout_ms == 0 || broker.publish_timeout_ms >= SLACK_RESPONSE_DEADLINE_MS {
        return Err(ConfigError::Validation(format!(
            "broker.publish_timeout_ms must be in range 1..{SLACK_RESPONSE_DEADLINE_MS}"
        )));
    }

    if broker.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "broker.request_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if broker.retry_base_delay_ms > broker.retry_max_delay_ms {
        return Err(ConfigError::Validation(
            "broker.retry_base_delay_ms must not exceed broker.retry_max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
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

fn read_env_with_fallback(key: &str, legacy_key: &str) -> Option<String> {
    read_env(key).or_else(|| read_env(legacy_key))
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    broker: Option<BrokerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BrokerPatch {
    addresses: Option<Vec<String>>,
    cluster_id: Option<String>,
    topic: Option<String>,
    publish_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
