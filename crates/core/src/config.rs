use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub generator: GeneratorConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub provider: GeneratorProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Engine tuning knobs; the defaults match the product's documented
/// behavior (7-day staleness, 2 nudges, 20-message context window).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub stale_days: u32,
    pub nudge_limit: u32,
    pub context_message_limit: u32,
    pub refresh_max_attempts: u32,
    pub refresh_poll_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorProvider {
    Disabled,
    Http,
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
    pub generator_provider: Option<GeneratorProvider>,
    pub generator_model: Option<String>,
    pub generator_api_key: Option<String>,
    pub server_port: Option<u16>,
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
                url: "sqlite://pulsey.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            generator: GeneratorConfig {
                provider: GeneratorProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "pulse-check-small".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            engine: EngineConfig {
                stale_days: 7,
                nudge_limit: 2,
                context_message_limit: 20,
                refresh_max_attempts: 3,
                refresh_poll_secs: 5,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for GeneratorProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported generator provider `{other}` (expected disabled|http)"
            ))),
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pulsey.toml"));
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

        if let Some(generator) = patch.generator {
            if let Some(provider) = generator.provider {
                self.generator.provider = provider;
            }
            if let Some(api_key_value) = generator.api_key {
                self.generator.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = generator.base_url {
                self.generator.base_url = Some(base_url);
            }
            if let Some(model) = generator.model {
                self.generator.model = model;
            }
            if let Some(timeout_secs) = generator.timeout_secs {
                self.generator.timeout_secs = timeout_secs;
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

        if let Some(engine) = patch.engine {
            if let Some(stale_days) = engine.stale_days {
                self.engine.stale_days = stale_days;
            }
            if let Some(nudge_limit) = engine.nudge_limit {
                self.engine.nudge_limit = nudge_limit;
            }
            if let Some(context_message_limit) = engine.context_message_limit {
                self.engine.context_message_limit = context_message_limit;
            }
            if let Some(refresh_max_attempts) = engine.refresh_max_attempts {
                self.engine.refresh_max_attempts = refresh_max_attempts;
            }
            if let Some(refresh_poll_secs) = engine.refresh_poll_secs {
                self.engine.refresh_poll_secs = refresh_poll_secs;
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
        if let Some(value) = read_env("PULSEY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PULSEY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PULSEY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PULSEY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PULSEY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PULSEY_GENERATOR_PROVIDER") {
            self.generator.provider = value.parse()?;
        }
        if let Some(value) = read_env("PULSEY_GENERATOR_API_KEY") {
            self.generator.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PULSEY_GENERATOR_BASE_URL") {
            self.generator.base_url = Some(value);
        }
        if let Some(value) = read_env("PULSEY_GENERATOR_MODEL") {
            self.generator.model = value;
        }
        if let Some(value) = read_env("PULSEY_GENERATOR_TIMEOUT_SECS") {
            self.generator.timeout_secs = parse_u64("PULSEY_GENERATOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PULSEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PULSEY_SERVER_PORT") {
            self.server.port = parse_u16("PULSEY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PULSEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PULSEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PULSEY_ENGINE_STALE_DAYS") {
            self.engine.stale_days = parse_u32("PULSEY_ENGINE_STALE_DAYS", &value)?;
        }
        if let Some(value) = read_env("PULSEY_ENGINE_NUDGE_LIMIT") {
            self.engine.nudge_limit = parse_u32("PULSEY_ENGINE_NUDGE_LIMIT", &value)?;
        }
        if let Some(value) = read_env("PULSEY_ENGINE_REFRESH_MAX_ATTEMPTS") {
            self.engine.refresh_max_attempts =
                parse_u32("PULSEY_ENGINE_REFRESH_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PULSEY_ENGINE_REFRESH_POLL_SECS") {
            self.engine.refresh_poll_secs = parse_u64("PULSEY_ENGINE_REFRESH_POLL_SECS", &value)?;
        }

        let log_level = read_env("PULSEY_LOGGING_LEVEL").or_else(|| read_env("PULSEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PULSEY_LOGGING_FORMAT").or_else(|| read_env("PULSEY_LOG_FORMAT"));
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
        if let Some(generator_provider) = overrides.generator_provider {
            self.generator.provider = generator_provider;
        }
        if let Some(generator_model) = overrides.generator_model {
            self.generator.model = generator_model;
        }
        if let Some(generator_api_key) = overrides.generator_api_key {
            self.generator.api_key = Some(secret_value(generator_api_key));
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_generator(&self.generator)?;
        validate_server(&self.server)?;
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pulsey.toml"), PathBuf::from("config/pulsey.toml")]
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

fn validate_generator(generator: &GeneratorConfig) -> Result<(), ConfigError> {
    if generator.timeout_secs == 0 || generator.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "generator.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if generator.provider == GeneratorProvider::Http {
        let missing_url =
            generator.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_url {
            return Err(ConfigError::Validation(
                "generator.base_url is required for the http provider".to_string(),
            ));
        }

        let missing_key = generator
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            return Err(ConfigError::Validation(
                "generator.api_key is required for the http provider".to_string(),
            ));
        }
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

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.stale_days == 0 {
        return Err(ConfigError::Validation(
            "engine.stale_days must be greater than zero".to_string(),
        ));
    }

    if engine.context_message_limit == 0 {
        return Err(ConfigError::Validation(
            "engine.context_message_limit must be greater than zero".to_string(),
        ));
    }

    if engine.refresh_max_attempts == 0 {
        return Err(ConfigError::Validation(
            "engine.refresh_max_attempts must be greater than zero".to_string(),
        ));
    }

    if engine.refresh_poll_secs == 0 {
        return Err(ConfigError::Validation(
            "engine.refresh_poll_secs must be greater than zero".to_string(),
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
    generator: Option<GeneratorPatch>,
    server: Option<ServerPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GeneratorPatch {
    provider: Option<GeneratorProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    stale_days: Option<u32>,
    nudge_limit: Option<u32>,
    context_message_limit: Option<u32>,
    refresh_max_attempts: Option<u32>,
    refresh_poll_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
