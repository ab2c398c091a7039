//! Configuration management using Figment.
//!
//! Sources are layered, lowest to highest precedence:
//! 1. Built-in defaults.
//! 2. `./config.toml`, if present.
//! 3. `CH_`-prefixed environment variables (nested via `_`).
//! 4. The literal environment variable names fixed by the external
//!    interface contract (`REMOTE_CONNECTOR_WS_URL`, `OAUTH_TOKEN_URL`,
//!    ...), which operators are expected to set directly.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Top-level configuration for the connector host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub breaker: BreakerDefaults,
    #[serde(default)]
    pub cache: CacheDefaults,
    #[serde(default)]
    pub http: HttpConfig,
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            loader: LoaderConfig::default(),
            breaker: BreakerDefaults::default(),
            cache: CacheDefaults::default(),
            http: HttpConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// JWT verification settings for the thin HTTP front end's
/// `/v1/connectors/:id/:operation` route. The WebSocket session is
/// authenticated separately via OAuth2 (`SessionConfig`); this section
/// only governs inbound bearer tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_public_key_path: PathBuf,
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
    #[serde(default)]
    pub jwt_issuer: Option<String>,
    #[serde(default)]
    pub jwt_audience: Option<String>,
}

fn default_jwt_algorithm() -> String {
    "RS256".to_string()
}

/// Remote Session Manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ws_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: None,
            audience: None,
            resource: None,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl SessionConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// External Loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_connectors_dir")]
    pub connectors_dir: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            connectors_dir: default_connectors_dir(),
        }
    }
}

/// Default Circuit Breaker thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerDefaults {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_half_open_after_ms")]
    pub half_open_after_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            half_open_after_ms: default_half_open_after_ms(),
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Default TTL Cache tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheDefaults {
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,
    #[serde(default = "default_schema_ttl_ms")]
    pub schema_ttl_ms: u64,
    #[serde(default = "default_get_ttl_ms")]
    pub get_ttl_ms: u64,
}

impl Default for CacheDefaults {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            default_ttl_ms: default_cache_ttl_ms(),
            schema_ttl_ms: default_schema_ttl_ms(),
            get_ttl_ms: default_get_ttl_ms(),
        }
    }
}

/// Thin HTTP front-end configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_connectors_dir() -> PathBuf {
    PathBuf::from("./connectors")
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    2
}
fn default_half_open_after_ms() -> u64 {
    10_000
}
fn default_max_concurrent() -> usize {
    20
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_cache_capacity() -> u64 {
    10_000
}
fn default_cache_ttl_ms() -> u64 {
    60_000
}
fn default_schema_ttl_ms() -> u64 {
    5 * 60_000
}
fn default_get_ttl_ms() -> u64 {
    30_000
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_http_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from defaults, `./config.toml`, `CH_`-prefixed
    /// env vars, and finally the fixed env var names from the external
    /// interface contract.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if PathBuf::from("config.toml").exists() {
            tracing::info!("loading configuration from config.toml");
            figment = figment.merge(Toml::file("config.toml"));
        }

        figment = figment.merge(Env::prefixed("CH_").split("_"));
        figment = Self::merge_fixed_env_names(figment);

        let config: Config = figment.extract()?;
        Ok(config)
    }

    /// Overlay the literally-named environment variables from the external
    /// interface contract, which take precedence over every other source
    /// because they are the fixed names operators are told to set.
    fn merge_fixed_env_names(figment: Figment) -> Figment {
        let mut figment = figment;
        if let Ok(v) = std::env::var("REMOTE_CONNECTOR_WS_URL") {
            figment = figment.merge(("session.ws_url", v));
        }
        if let Ok(v) = std::env::var("OAUTH_TOKEN_URL") {
            figment = figment.merge(("session.token_url", v));
        }
        if let Ok(v) = std::env::var("OAUTH_CLIENT_ID") {
            figment = figment.merge(("session.client_id", v));
        }
        if let Ok(v) = std::env::var("OAUTH_CLIENT_SECRET") {
            figment = figment.merge(("session.client_secret", v));
        }
        if let Ok(v) = std::env::var("OAUTH_SCOPE") {
            figment = figment.merge(("session.scope", v));
        }
        if let Ok(v) = std::env::var("OAUTH_AUDIENCE") {
            figment = figment.merge(("session.audience", v));
        }
        if let Ok(v) = std::env::var("OAUTH_RESOURCE") {
            figment = figment.merge(("session.resource", v));
        }
        if let Ok(v) = std::env::var("CONNECTORS_DIR") {
            figment = figment.merge(("loader.connectors_dir", v));
        }
        figment
    }
}
