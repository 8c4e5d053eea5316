//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub graph: GraphConfig,
    pub subscriptions: SubscriptionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "market.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Session token verification
///
/// Tokens are issued by the external identity provider; this service only
/// checks their signature and expiry.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
}

/// How follow/unfollow maintain the denormalized counters
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterPolicy {
    /// Check the edge inside the transaction; repeated calls are no-ops.
    #[default]
    Guarded,
    /// Always write and increment, as the legacy client did.
    Blind,
}

/// Follow graph behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub counter_policy: CounterPolicy,
    /// Upper bound for list endpoints
    pub max_page_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            counter_policy: CounterPolicy::Guarded,
            max_page_size: 100,
        }
    }
}

/// Live subscription configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Buffered change events per subscriber before it lags
    pub channel_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` still takes precedence.
    pub fn filter_directive(&self) -> String {
        format!("artisan_graph={},tower_http=info", self.level.trim())
    }

    /// Whether logs are emitted as JSON lines
    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (ARTISAN_GRAPH__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/artisan-graph.db")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("graph.counter_policy", "guarded")?
            .set_default("graph.max_page_size", 100)?
            .set_default("subscriptions.channel_capacity", 256)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (ARTISAN_GRAPH__*)
            .add_source(
                Environment::with_prefix("ARTISAN_GRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.graph.max_page_size == 0 {
            return Err(crate::error::AppError::Config(
                "graph.max_page_size must be greater than 0".to_string(),
            ));
        }

        if self.subscriptions.channel_capacity == 0 {
            return Err(crate::error::AppError::Config(
                "subscriptions.channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.graph.counter_policy == CounterPolicy::Blind {
            tracing::warn!(
                "graph.counter_policy=blind: repeated follow/unfollow calls will drift counters"
            );
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/artisan-graph-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
            },
            graph: GraphConfig::default(),
            subscriptions: SubscriptionConfig {
                channel_capacity: 256,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "market.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let mut config = valid_config();
        config.graph.max_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn counter_policy_defaults_to_guarded() {
        let graph: GraphConfig =
            serde_json::from_value(serde_json::json!({ "max_page_size": 50 })).unwrap();
        assert_eq!(graph.counter_policy, CounterPolicy::Guarded);

        let graph: GraphConfig = serde_json::from_value(
            serde_json::json!({ "counter_policy": "blind", "max_page_size": 50 }),
        )
        .unwrap();
        assert_eq!(graph.counter_policy, CounterPolicy::Blind);
    }

    #[test]
    fn logging_section_drives_subscriber_setup() {
        let mut logging = valid_config().logging;
        assert_eq!(logging.filter_directive(), "artisan_graph=info,tower_http=info");
        assert!(!logging.is_json());

        logging.level = "debug".to_string();
        logging.format = "JSON".to_string();
        assert_eq!(logging.filter_directive(), "artisan_graph=debug,tower_http=info");
        assert!(logging.is_json());
    }
}
