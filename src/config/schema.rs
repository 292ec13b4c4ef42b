//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the UI server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Hostname (or IP) to accept traffic on.
    pub hostname: String,

    /// Port to accept traffic on.
    pub port: u16,

    /// Authentication configuration.
    pub authentication: AuthenticationConfig,

    /// Browser-facing configuration.
    pub client: ClientConfig,

    /// Feature flag overrides exposed to the browser.
    pub feature_flags: BTreeMap<String, bool>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Module enablement.
    pub modules: ModulesConfig,

    /// Backend admin API configuration.
    pub proxy: ProxyConfig,

    /// Session cookie configuration.
    pub session: SessionConfig,

    /// Bounds for the websocket relay.
    pub relay: RelayConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 3000,
            authentication: AuthenticationConfig::default(),
            client: ClientConfig::default(),
            feature_flags: BTreeMap::new(),
            logging: LoggingConfig::default(),
            modules: ModulesConfig::default(),
            proxy: ProxyConfig::default(),
            session: SessionConfig::default(),
            relay: RelayConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Supported authentication strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    #[default]
    None,
    Scram,
    Oauth,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// Which strategy authenticates users.
    pub strategy: AuthStrategy,
}

/// Minimum TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MinTlsVersion {
    #[serde(rename = "TLSv1.2")]
    Tls12,
    #[serde(rename = "TLSv1.3")]
    Tls13,
}

/// TLS material for the browser-facing listener.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerTlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: Option<String>,

    /// Path to private key file (PEM).
    pub key_path: Option<String>,

    /// Minimum TLS version offered to browsers.
    pub min_tls: Option<MinTlsVersion>,
}

impl ListenerTlsConfig {
    /// True when both certificate and key are configured.
    pub fn is_enabled(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }
}

/// Browser-facing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TLS transport for the listener.
    pub transport: ListenerTlsConfig,

    /// Directory of static files served by the client module.
    pub public_dir: String,

    /// Overrides sent to the browser by the config module.
    pub config_overrides: serde_json::Value,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: ListenerTlsConfig::default(),
            public_dir: "./dist".to_string(),
            config_overrides: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Module enablement, keyed by module name.
///
/// Names that are not present are treated as disabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ModulesConfig(BTreeMap<String, bool>);

impl ModulesConfig {
    /// Build an enablement map from `(name, enabled)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether the named module is currently switched on.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    /// Switch a module on or off.
    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.0.insert(name.into(), enabled);
    }

    /// Names of all enabled modules.
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, on)| **on).map(|(name, _)| name.as_str())
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self::from_pairs([
            ("api", true),
            ("client", true),
            ("config", true),
            ("log", true),
            ("mockapi", false),
        ])
    }
}

/// TLS settings for outbound connections to the backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendTlsConfig {
    /// Certificate authority (PEM file) trusted for the backend. When set,
    /// the backend is reached over https/wss.
    pub ca_path: Option<String>,

    /// Minimum TLS version used towards the backend.
    pub min_tls: Option<MinTlsVersion>,
}

/// Backend admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Hostname of the backend server.
    pub hostname: String,

    /// Port of the backend server.
    pub port: u16,

    /// Context root of the admin API on the backend.
    pub context_root: String,

    /// TLS transport towards the backend.
    pub transport: BackendTlsConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 8011,
            context_root: "/api".to_string(),
            transport: BackendTlsConfig::default(),
        }
    }
}

/// Session configuration, consumed by the session middleware.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "admin-ui-session".to_string(),
        }
    }
}

/// Relay bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How long the pre-upgrade step may wait for the backend socket.
    pub connect_timeout_ms: u64,

    /// Age after which an unpaired backend socket is reaped.
    pub pending_ttl_secs: u64,

    /// How often the reaper runs.
    pub reap_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            pending_ttl_secs: 30,
            reap_interval_secs: 10,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Plain HTTP request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("port = 8080").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.hostname, "0.0.0.0");
        assert!(config.modules.is_enabled("api"));
        assert!(!config.modules.is_enabled("mockapi"));
        assert_eq!(config.authentication.strategy, AuthStrategy::None);
    }

    #[test]
    fn modules_table_replaces_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [modules]
            mockapi = true
            log = false
            "#,
        )
        .unwrap();
        assert!(config.modules.is_enabled("mockapi"));
        assert!(!config.modules.is_enabled("log"));
        // Absent names are disabled.
        assert!(!config.modules.is_enabled("api"));
    }

    #[test]
    fn tls_versions_parse() {
        let config: ServerConfig = toml::from_str(
            r#"
            [proxy.transport]
            ca_path = "/etc/ca.pem"
            min_tls = "TLSv1.3"
            "#,
        )
        .unwrap();
        assert_eq!(config.proxy.transport.min_tls, Some(MinTlsVersion::Tls13));
        assert_eq!(config.proxy.transport.ca_path.as_deref(), Some("/etc/ca.pem"));
    }
}
