//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;

/// Default tolerance between the signed webhook timestamp and the local clock.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Default bucket holding gallery uploads.
pub const DEFAULT_GALLERY_BUCKET: &str = "gallery";

/// API-specific configuration (HTTP bind, shared database, webhook and admin
/// secrets) so the HTTP surface does not depend on sweeper-only variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    stripe_webhook_secret: String,
    admin_api_token: String,
    webhook_tolerance: Duration,
    object_storage: ObjectStorageConfig,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let webhook_tolerance = match get_optional_var("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => Duration::from_secs(parse_number("STRIPE_WEBHOOK_TOLERANCE_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_WEBHOOK_TOLERANCE_SECS),
        };

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            stripe_webhook_secret: get_required_var("STRIPE_WEBHOOK_SECRET")?,
            admin_api_token: get_required_var("ADMIN_API_TOKEN")?,
            webhook_tolerance,
            object_storage: ObjectStorageConfig::from_env(),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn stripe_webhook_secret(&self) -> &str {
        &self.stripe_webhook_secret
    }

    pub fn admin_api_token(&self) -> &str {
        &self.admin_api_token
    }

    pub fn webhook_tolerance(&self) -> Duration {
        self.webhook_tolerance
    }

    pub fn object_storage(&self) -> &ObjectStorageConfig {
        &self.object_storage
    }
}

/// Connection details for the object store that backs gallery uploads.
/// Absent `STORAGE_URL` disables file existence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStorageConfig {
    base_url: Option<String>,
    service_key: Option<String>,
    gallery_bucket: String,
}

impl ObjectStorageConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: get_optional_var("STORAGE_URL"),
            service_key: get_optional_var("STORAGE_SERVICE_KEY"),
            gallery_bucket: get_optional_var("STORAGE_GALLERY_BUCKET")
                .unwrap_or_else(|| DEFAULT_GALLERY_BUCKET.to_string()),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn service_key(&self) -> Option<&str> {
        self.service_key.as_deref()
    }

    pub fn gallery_bucket(&self) -> &str {
        &self.gallery_bucket
    }
}

/// Sweeper configuration: shared database plus the sweep cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    database_url: String,
    interval: Option<Duration>,
    auto_fix: bool,
    object_storage: ObjectStorageConfig,
}

impl SweeperConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// required process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_required_var("DATABASE_URL")?;
        let interval = get_optional_var("SWEEPER_INTERVAL_SECS")
            .map(|raw| parse_number("SWEEPER_INTERVAL_SECS", &raw))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let auto_fix = get_optional_var("SWEEPER_AUTO_FIX")
            .map(|raw| parse_bool("SWEEPER_AUTO_FIX", &raw))
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            database_url,
            interval,
            auto_fix,
            object_storage: ObjectStorageConfig::from_env(),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// `None` means a single sweep.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn auto_fix(&self) -> bool {
        self.auto_fix
    }

    pub fn object_storage(&self) -> &ObjectStorageConfig {
        &self.object_storage
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("AMORA_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean in `{key}`: `{value}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
