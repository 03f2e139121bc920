//! Configuration Module
//!
//! Connection descriptor for the remote (Redis) store adapter.
//! The in-process store needs no configuration.

use std::env;

/// Remote store connection parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Redis host name or address
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Optional password; omitted from the connection string when absent
    pub password: Option<String>,
}

impl RemoteConfig {
    /// Creates a new RemoteConfig from explicit parts.
    pub fn new(host: impl Into<String>, port: u16, password: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.filter(|p| !p.is_empty()),
        }
    }

    /// Creates a new RemoteConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_REDIS_HOST` - Redis host (default: 127.0.0.1)
    /// - `CACHE_REDIS_PORT` - Redis port (default: 6379)
    /// - `CACHE_REDIS_PASSWORD` - Redis password (default: none)
    pub fn from_env() -> Self {
        Self::new(
            env::var("CACHE_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            env::var("CACHE_REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6379),
            env::var("CACHE_REDIS_PASSWORD").ok(),
        )
    }

    /// Returns the descriptor in `host:port[,password=pwd]` form.
    ///
    /// The password segment is omitted entirely when no password is set.
    pub fn connection_string(&self) -> String {
        match &self.password {
            Some(pwd) => format!("{}:{},password={}", self.host, self.port, pwd),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Returns the URL form the redis client dials.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(pwd) => format!("redis://:{}@{}:{}/", pwd, self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RemoteConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_connection_string_without_password() {
        let config = RemoteConfig::new("cache.internal", 6380, None);
        assert_eq!(config.connection_string(), "cache.internal:6380");
    }

    #[test]
    fn test_connection_string_with_password() {
        let config = RemoteConfig::new("cache.internal", 6380, Some("s3cret".to_string()));
        assert_eq!(
            config.connection_string(),
            "cache.internal:6380,password=s3cret"
        );
    }

    #[test]
    fn test_empty_password_treated_as_absent() {
        let config = RemoteConfig::new("localhost", 6379, Some(String::new()));
        assert_eq!(config.connection_string(), "localhost:6379");
        assert_eq!(config.redis_url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_redis_url_with_password() {
        let config = RemoteConfig::new("localhost", 6379, Some("pwd".to_string()));
        assert_eq!(config.redis_url(), "redis://:pwd@localhost:6379/");
    }
}
