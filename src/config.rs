//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf, time::Duration};

use crate::error::AppError;
use crate::federation::ReadPolicyMode;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub federation: FederationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com/"
    pub fn base_url(&self) -> Result<url::Url, AppError> {
        url::Url::parse(&format!("{}://{}", self.protocol, self.domain))
            .map_err(|e| AppError::Config(format!("invalid server base URL: {}", e)))
    }
}

/// Federated read configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Which authorization policy adapter to install
    #[serde(default)]
    pub read_policy: ReadPolicyMode,
    /// Accepted distance between a signed `Date` and our clock
    pub signature_max_skew_seconds: u64,
    /// How long resolved public keys are reused
    pub key_cache_ttl_seconds: u64,
    /// `max-age` advertised on anonymous reads
    pub public_max_age_seconds: u64,
    /// Bound on each store, policy and key resolver call
    pub collaborator_timeout_ms: u64,
    /// Key id advertised when signing outbound key fetches
    #[serde(default)]
    pub signing_key_id: Option<String>,
    /// PEM private key for outbound key fetches
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
}

impl FederationConfig {
    pub fn signature_max_skew(&self) -> Duration {
        Duration::from_secs(self.signature_max_skew_seconds)
    }

    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_seconds)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

/// Object store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON array of documents loaded at startup
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (APGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("federation.read_policy", "optional")?
            .set_default("federation.signature_max_skew_seconds", 300)?
            .set_default("federation.key_cache_ttl_seconds", 3600)?
            .set_default("federation.public_max_age_seconds", 180)?
            .set_default("federation.collaborator_timeout_ms", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (APGATE__*)
            .add_source(
                Environment::with_prefix("APGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.server.domain.trim().is_empty() {
            return Err(AppError::Config("server.domain must not be empty".to_string()));
        }

        self.server.base_url()?;

        if !self.server.protocol.eq_ignore_ascii_case("https") {
            if is_local_server_domain(&self.server.domain) {
                tracing::warn!(
                    domain = %self.server.domain,
                    "Serving federated reads over plain HTTP for local development"
                );
            } else {
                return Err(AppError::Config(
                    "server.protocol must be https for non-local server domains".to_string(),
                ));
            }
        }

        if self.federation.collaborator_timeout_ms == 0 {
            return Err(AppError::Config(
                "federation.collaborator_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.federation.signing_key_id.is_some() != self.federation.signing_key_path.is_some()
        {
            return Err(AppError::Config(
                "federation.signing_key_id and federation.signing_key_path must be set together"
                    .to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
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
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
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
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            federation: FederationConfig {
                read_policy: ReadPolicyMode::Optional,
                signature_max_skew_seconds: 300,
                key_cache_ttl_seconds: 3600,
                public_max_age_seconds: 180,
                collaborator_timeout_ms: 10_000,
                signing_key_id: None,
                signing_key_path: None,
            },
            store: StoreConfig::default(),
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
        assert_eq!(
            config.server.base_url().unwrap().as_str(),
            "http://localhost:8080/"
        );
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "social.example.com".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_half_configured_signing_identity() {
        let mut config = valid_config();
        config.federation.signing_key_id =
            Some("https://local.example/actor#main-key".to_string());

        let error = config
            .validate()
            .expect_err("signing key id without a key path must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("signing_key_path")
        ));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = valid_config();
        config.federation.collaborator_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_follow_configured_units() {
        let config = valid_config();
        assert_eq!(config.federation.signature_max_skew(), Duration::from_secs(300));
        assert_eq!(
            config.federation.collaborator_timeout(),
            Duration::from_millis(10_000)
        );
    }

    #[test]
    fn read_policy_parses_lowercase_names() {
        let mode: ReadPolicyMode = serde_json::from_str("\"signed\"").unwrap();
        assert_eq!(mode, ReadPolicyMode::Signed);
    }
}
