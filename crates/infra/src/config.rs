//! Layered runtime settings.
//!
//! Sources, later ones winning:
//! 1. defaults in code
//! 2. `config/{GESCOM_ENV}.toml` (optional, `GESCOM_ENV` defaults to `development`)
//! 3. `GESCOM__SECTION__KEY` environment variables (a `.env` file is read first)
//!
//! ```text
//! GESCOM__SERVER__PORT=9000
//! GESCOM__DATABASE__URL=postgres://gescom@localhost/gescom
//! GESCOM__DATABASE__USE_PERSISTENT_STORE=true
//! GESCOM__LOGGING__JSON=true
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::command_dispatcher::DEFAULT_MAX_RETRIES;

/// Payment term applied when an invoice is created without a due date.
pub const DEFAULT_DUE_DAYS: u32 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub dispatch: DispatchSettings,
    pub invoicing: InvoicingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
    /// Use the Postgres event store instead of the in-memory one.
    pub use_persistent_store: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            use_persistent_store: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,gescom_infra=debug,gescom_api=debug".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub max_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvoicingSettings {
    pub default_due_days: u32,
}

impl Default for InvoicingSettings {
    fn default() -> Self {
        Self {
            default_due_days: DEFAULT_DUE_DAYS,
        }
    }
}

impl Settings {
    /// Load from every source, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let environment = std::env::var("GESCOM_ENV").unwrap_or_else(|_| "development".to_string());

        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                config::Environment::with_prefix("GESCOM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.use_persistent_store && self.database.url.is_none() {
            return Err(ConfigError::Invalid(
                "database.url is required when database.use_persistent_store is set".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(settings.invoicing.default_due_days, 30);
        assert_eq!(settings.dispatch.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn persistent_store_needs_a_url() {
        let mut settings = Settings::default();
        settings.database.use_persistent_store = true;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        settings.database.url = Some("postgres://localhost/gescom".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_sources_fall_back_to_defaults() {
        let settings: Settings = config::Config::builder()
            .set_override("server.port", 9100_i64)
            .unwrap()
            .set_override("invoicing.default_due_days", 45_i64)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.invoicing.default_due_days, 45);
        assert!(!settings.logging.json);
    }
}
