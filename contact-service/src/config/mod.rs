//! Configuration module for contact-service.

use crate::services::identity_cipher::UsernameKeys;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ContactConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub username_keys: UsernameKeyConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Media API holding avatar files and minting their read tokens.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub project_id: String,
    pub api_key: Secret<String>,
    pub avatar_bucket_id: String,
    pub timeout_secs: u64,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Base64 key material; decoded once into [`UsernameKeys`].
#[derive(Debug, Clone)]
pub struct UsernameKeyConfig {
    pub encryption_key: Secret<String>,
    pub lookup_key: Secret<String>,
}

impl UsernameKeyConfig {
    pub fn decode(&self) -> Result<UsernameKeys, AppError> {
        UsernameKeys::from_base64(
            self.encryption_key.expose_secret(),
            self.lookup_key.expose_secret(),
        )
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid username keys: {}", e)))
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::ConfigError(anyhow::anyhow!("{} is required", key)))
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ContactConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "contact-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            storage: StorageConfig {
                endpoint: required("STORAGE_ENDPOINT")?,
                project_id: required("STORAGE_PROJECT_ID")?,
                api_key: Secret::new(required("STORAGE_API_KEY")?),
                avatar_bucket_id: required("AVATAR_BUCKET_ID")?,
                timeout_secs: parsed_or("STORAGE_TIMEOUT_SECS", 10),
            },
            username_keys: UsernameKeyConfig {
                encryption_key: Secret::new(required("USERNAME_ENCRYPTION_KEY")?),
                lookup_key: Secret::new(required("USERNAME_LOOKUP_KEY")?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [(&str, &str); 8] = [
        ("DATABASE_URL", "postgres://localhost/contacts"),
        ("STORAGE_ENDPOINT", "https://media.test/v1"),
        ("STORAGE_PROJECT_ID", "proj"),
        ("STORAGE_API_KEY", "api-key"),
        ("AVATAR_BUCKET_ID", "avatars"),
        // 32 zero bytes
        ("USERNAME_ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
        ("USERNAME_LOOKUP_KEY", "bG9va3VwLWtleQ=="),
        ("STORAGE_TIMEOUT_SECS", "3"),
    ];

    fn set_all() {
        for (k, v) in VARS {
            env::set_var(k, v);
        }
    }

    fn clear_all() {
        for (k, _) in VARS {
            env::remove_var(k);
        }
    }

    #[test]
    #[serial]
    fn loads_from_environment() {
        set_all();
        let config = ContactConfig::from_env().unwrap();
        clear_all();

        assert_eq!(config.service_name, "contact-service");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.storage.timeout(), Duration::from_secs(3));
        assert!(config.username_keys.decode().is_ok());
        assert!(!format!("{:?}", config).contains("api-key"));
    }

    #[test]
    #[serial]
    fn missing_required_variable_is_config_error() {
        set_all();
        env::remove_var("AVATAR_BUCKET_ID");
        let err = ContactConfig::from_env().unwrap_err();
        clear_all();

        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("AVATAR_BUCKET_ID"));
    }

    #[test]
    fn short_encryption_key_is_rejected() {
        let keys = UsernameKeyConfig {
            encryption_key: Secret::new("AAAA".to_string()),
            lookup_key: Secret::new("bG9va3Vw".to_string()),
        };
        assert!(keys.decode().is_err());
    }
}
