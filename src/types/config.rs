//! Configuration structures.
//!
//! Configuration is an immutable snapshot loaded once from environment
//! variables at process start. Unset variables fall back to defaults; a
//! variable that is set but cannot be parsed fails startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::errors::{Error, Result};

/// Hard ceiling on batch size accepted by either protocol.
pub const MAX_BATCH_ITEMS: usize = 100;

/// Global service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Listener and process-wide settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,

    /// Conversion limits.
    #[serde(default)]
    pub converter: ConverterConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "testing" => Ok(Environment::Testing),
            other => Err(Error::config(format!("invalid environment: {}", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Testing => "testing",
        };
        f.write_str(s)
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::config(format!("invalid log level: {}", other))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(Error::config(format!("invalid log format: {}", other))),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST listener.
    #[serde(default)]
    pub http: HttpConfig,

    /// RPC listener.
    #[serde(default)]
    pub rpc: RpcConfig,

    pub environment: Environment,

    /// Service name reported by health and info endpoints.
    pub name: String,

    /// Service version reported by health endpoints.
    pub version: String,

    /// Outer bound for the whole shutdown sequence.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Per-protocol drain window.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            rpc: RpcConfig::default(),
            environment: Environment::default(),
            name: "html2md".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            shutdown_timeout: Duration::from_secs(30),
            grace_period: Duration::from_secs(10),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,

    /// Time allowed to receive a request body.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Time allowed to produce a response.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Keep-alive idle time.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl HttpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// RPC listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,

    /// Maximum accepted frame payload size in bytes.
    pub max_recv_msg_size: u32,

    /// Maximum response payload size in bytes. Larger responses are replaced
    /// by a RESOURCE_EXHAUSTED error.
    pub max_send_msg_size: u32,

    /// Read timeout per frame. Connections idle beyond this duration are dropped.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Write timeout per frame.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Maximum concurrent TCP connections. Connections beyond this limit are refused.
    pub max_connections: usize,
}

impl RpcConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
            max_recv_msg_size: 4 * 1024 * 1024,
            max_send_msg_size: 4 * 1024 * 1024,
            timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            max_connections: 1000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

/// Conversion limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Maximum HTML size per item, in bytes.
    pub max_input_size: usize,

    /// Maximum items per batch call (never above [`MAX_BATCH_ITEMS`]).
    pub max_batch_size: usize,

    /// Plugins applied when a request names none.
    pub default_plugins: Vec<String>,

    /// Time budget for a single conversion.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Number of batch items converted in parallel.
    pub batch_concurrency: usize,

    /// Reported by the info endpoint; results are never cached.
    pub enable_cache: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            max_input_size: 10 * 1024 * 1024,
            max_batch_size: MAX_BATCH_ITEMS,
            default_plugins: vec!["base".to_string(), "commonmark".to_string()],
            timeout: Duration::from_secs(30),
            batch_concurrency: 4,
            enable_cache: false,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Config::default();

        let http = HttpConfig {
            host: env.string("HTTP_HOST", &defaults.server.http.host),
            port: env.parse("HTTP_PORT", defaults.server.http.port)?,
            read_timeout: env.duration("HTTP_READ_TIMEOUT", defaults.server.http.read_timeout)?,
            write_timeout: env.duration("HTTP_WRITE_TIMEOUT", defaults.server.http.write_timeout)?,
            idle_timeout: env.duration("HTTP_IDLE_TIMEOUT", defaults.server.http.idle_timeout)?,
        };

        let rpc = RpcConfig {
            host: env.string("GRPC_HOST", &defaults.server.rpc.host),
            port: env.parse("GRPC_PORT", defaults.server.rpc.port)?,
            max_recv_msg_size: env.parse("GRPC_MAX_RECV_MSG_SIZE", defaults.server.rpc.max_recv_msg_size)?,
            max_send_msg_size: env.parse("GRPC_MAX_SEND_MSG_SIZE", defaults.server.rpc.max_send_msg_size)?,
            timeout: env.duration("GRPC_TIMEOUT", defaults.server.rpc.timeout)?,
            write_timeout: env.duration("GRPC_WRITE_TIMEOUT", defaults.server.rpc.write_timeout)?,
            max_connections: env.parse("GRPC_MAX_CONNECTIONS", defaults.server.rpc.max_connections)?,
        };

        let server = ServerConfig {
            http,
            rpc,
            environment: env.parse("ENVIRONMENT", defaults.server.environment)?,
            name: env.string("SERVICE_NAME", &defaults.server.name),
            version: env.string("SERVICE_VERSION", &defaults.server.version),
            shutdown_timeout: env.duration("SERVICE_TIMEOUT", defaults.server.shutdown_timeout)?,
            grace_period: env.duration("SHUTDOWN_GRACE_PERIOD", defaults.server.grace_period)?,
        };

        let log = LogConfig {
            level: env.parse("LOG_LEVEL", defaults.log.level)?,
            format: env.parse("LOG_FORMAT", defaults.log.format)?,
        };

        let converter = ConverterConfig {
            max_input_size: env.parse("CONVERTER_MAX_INPUT_SIZE", defaults.converter.max_input_size)?,
            max_batch_size: env.parse("CONVERTER_MAX_BATCH_SIZE", defaults.converter.max_batch_size)?,
            default_plugins: env.list("CONVERTER_DEFAULT_PLUGINS", &defaults.converter.default_plugins),
            timeout: env.duration("CONVERTER_TIMEOUT", defaults.converter.timeout)?,
            batch_concurrency: env.parse(
                "CONVERTER_BATCH_CONCURRENCY",
                defaults.converter.batch_concurrency,
            )?,
            enable_cache: env.parse("CONVERTER_ENABLE_CACHE", defaults.converter.enable_cache)?,
        };

        Ok(Config {
            server,
            log,
            converter,
        })
    }

    /// Reject values that would leave the service in an invalid running state.
    pub fn validate(&self) -> Result<()> {
        if self.server.http.port == 0 {
            return Err(Error::config("invalid HTTP port: 0"));
        }
        if self.server.rpc.port == 0 {
            return Err(Error::config("invalid RPC port: 0"));
        }
        if self.server.name.trim().is_empty() {
            return Err(Error::config("service name cannot be empty"));
        }
        if self.server.grace_period.is_zero() {
            return Err(Error::config("shutdown grace period must be positive"));
        }
        if self.server.grace_period > self.server.shutdown_timeout {
            return Err(Error::config(format!(
                "shutdown grace period ({:?}) exceeds shutdown timeout ({:?})",
                self.server.grace_period, self.server.shutdown_timeout
            )));
        }
        if self.server.rpc.max_recv_msg_size == 0 || self.server.rpc.max_send_msg_size == 0 {
            return Err(Error::config("RPC message size limits must be positive"));
        }
        if self.server.rpc.max_connections == 0 {
            return Err(Error::config("RPC max connections must be positive"));
        }
        if self.converter.max_input_size == 0 {
            return Err(Error::config("max input size must be positive"));
        }
        if self.converter.max_batch_size == 0 || self.converter.max_batch_size > MAX_BATCH_ITEMS {
            return Err(Error::config(format!(
                "max batch size must be between 1 and {}, got {}",
                MAX_BATCH_ITEMS, self.converter.max_batch_size
            )));
        }
        if self.converter.batch_concurrency == 0 {
            return Err(Error::config("batch concurrency must be positive"));
        }
        if self.converter.timeout.is_zero() {
            return Err(Error::config("converter timeout must be positive"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }
}

/// Typed accessors over a string lookup.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value
                .parse()
                .map_err(|e| Error::config(format!("{}={}: {}", key, value, e))),
            None => Ok(default),
        }
    }

    fn duration(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.raw(key) {
            Some(value) => humantime::parse_duration(&value)
                .map_err(|e| Error::config(format!("{}={}: {}", key, value, e))),
            None => Ok(default),
        }
    }

    fn list(&self, key: &str, default: &[String]) -> Vec<String> {
        match self.raw(key) {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => default.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = load(&[]).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.http.port, 8080);
        assert_eq!(config.server.rpc.port, 9090);
        assert_eq!(config.server.grace_period, Duration::from_secs(10));
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.converter.max_batch_size, 100);
        assert_eq!(config.converter.default_plugins, vec!["base", "commonmark"]);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HTTP_PORT", "18080"),
            ("GRPC_HOST", "127.0.0.1"),
            ("HTTP_READ_TIMEOUT", "5s"),
            ("ENVIRONMENT", "production"),
            ("LOG_LEVEL", "debug"),
            ("CONVERTER_DEFAULT_PLUGINS", "base, table"),
            ("CONVERTER_ENABLE_CACHE", "true"),
        ])
        .unwrap();

        assert_eq!(config.server.http.port, 18080);
        assert_eq!(config.server.rpc.address(), "127.0.0.1:9090");
        assert_eq!(config.server.http.read_timeout, Duration::from_secs(5));
        assert!(config.is_production());
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.converter.default_plugins, vec!["base", "table"]);
        assert!(config.converter.enable_cache);
    }

    #[test]
    fn test_unparsable_values_fail_instead_of_falling_back() {
        assert!(load(&[("HTTP_PORT", "eighty")]).is_err());
        assert!(load(&[("HTTP_PORT", "70000")]).is_err());
        assert!(load(&[("GRPC_TIMEOUT", "soon")]).is_err());
        assert!(load(&[("ENVIRONMENT", "staging")]).is_err());
        assert!(load(&[("LOG_LEVEL", "verbose")]).is_err());
        assert!(load(&[("CONVERTER_ENABLE_CACHE", "maybe")]).is_err());
    }

    #[test]
    fn test_empty_value_counts_as_unset() {
        let config = load(&[("HTTP_PORT", "")]).unwrap();
        assert_eq!(config.server.http.port, 8080);
    }

    #[test]
    fn test_validation_rejects_port_zero() {
        let config = load(&[("HTTP_PORT", "0")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_batch_size_above_ceiling() {
        let config = load(&[("CONVERTER_MAX_BATCH_SIZE", "101")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_grace_longer_than_outer_bound() {
        let config = load(&[("SHUTDOWN_GRACE_PERIOD", "40s")]).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
