//! Gateway configuration.

use std::env;
use std::time::Duration;

use fnbus_auth::ValidatorConfig;
use fnbus_auth::credentials::DEFAULT_CACHE_TTL;
use fnbus_auth::validator::DEFAULT_LOOKUP_TIMEOUT;
use fnbus_auth_http::GuardConfig;
use fnbus_auth_http::identity::DEFAULT_IDENTITY_CACHE_TTL;

use crate::service::DEFAULT_MAX_BODY_BYTES;

/// Default bind address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:4580";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A numeric setting could not be parsed.
    #[error("{key} must be a non-negative whole number, got `{value}`")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// Only one half of the static key pair was set.
    #[error("ACCESS_KEY and SECRET_KEY must be set together")]
    IncompleteStaticKey,
}

/// Where secrets come from.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// A remote credential authority.
    Remote {
        /// Lookup endpoint.
        endpoint: String,
    },
    /// A single identifier/secret pair from the environment.
    Static {
        /// Identifier.
        access_key: String,
        /// Secret.
        secret_key: String,
    },
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote { endpoint } => f
                .debug_struct("Remote")
                .field("endpoint", endpoint)
                .finish(),
            Self::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
        }
    }
}

/// Gateway configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (`GATEWAY_LISTEN`).
    pub listen: String,
    /// Log filter (`LOG_LEVEL`).
    pub log_level: String,
    /// Secret source; `None` if neither an endpoint nor a static key is set.
    pub secrets: Option<SecretSource>,
    /// Cache looked-up secrets (`FNBUS_ENABLE_CACHING`).
    pub enable_caching: bool,
    /// Cache entry lifetime (`FNBUS_CACHE_TTL_SECS`).
    pub cache_ttl: Duration,
    /// Per-lookup timeout (`FNBUS_LOOKUP_TIMEOUT_SECS`).
    pub lookup_timeout: Duration,
    /// Accepted clock skew; unset disables the check (`FNBUS_MAX_CLOCK_SKEW_SECS`).
    pub max_clock_skew: Option<Duration>,
    /// Accept FNSIGN requests (`FNBUS_ENABLE_LEGACY`).
    pub enable_legacy: bool,
    /// Largest accepted request body (`FNBUS_MAX_BODY_BYTES`).
    pub max_body_bytes: usize,
    /// Enterprise identity authority; unset disables claims (`FNBUS_IDENTITY_AUTHORITY`).
    pub identity_authority: Option<String>,
    /// Cache enterprise identities (`FNBUS_IDENTITY_ENABLE_CACHING`).
    pub identity_enable_caching: bool,
    /// Identity cache entry lifetime (`FNBUS_IDENTITY_CACHE_TTL_SECS`).
    pub identity_cache_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_owned(),
            log_level: "info".to_owned(),
            secrets: None,
            enable_caching: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            max_clock_skew: None,
            enable_legacy: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            identity_authority: None,
            identity_enable_caching: true,
            identity_cache_ttl: DEFAULT_IDENTITY_CACHE_TTL,
        }
    }
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| var(key).map_or(default, |v| is_truthy(&v));
        let number = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            var(key)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidNumber { key, value })
                })
                .transpose()
        };
        let seconds = |key: &'static str| -> Result<Option<Duration>, ConfigError> {
            Ok(number(key)?.map(Duration::from_secs))
        };
        let bytes = |key: &'static str| -> Result<Option<usize>, ConfigError> {
            number(key)?
                .map(|n| {
                    usize::try_from(n).map_err(|_| ConfigError::InvalidNumber {
                        key,
                        value: n.to_string(),
                    })
                })
                .transpose()
        };

        let endpoint = var("FNBUS_CREDENTIAL_ENDPOINT").filter(|v| !v.trim().is_empty());
        let secrets = match (endpoint, var("ACCESS_KEY"), var("SECRET_KEY")) {
            (Some(endpoint), _, _) => Some(SecretSource::Remote { endpoint }),
            (None, Some(access_key), Some(secret_key)) => Some(SecretSource::Static {
                access_key,
                secret_key,
            }),
            (None, None, None) => None,
            (None, _, _) => return Err(ConfigError::IncompleteStaticKey),
        };

        Ok(Self {
            listen: var("GATEWAY_LISTEN").unwrap_or(defaults.listen),
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
            secrets,
            enable_caching: flag("FNBUS_ENABLE_CACHING", defaults.enable_caching),
            cache_ttl: seconds("FNBUS_CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl),
            lookup_timeout: seconds("FNBUS_LOOKUP_TIMEOUT_SECS")?
                .unwrap_or(defaults.lookup_timeout),
            max_clock_skew: seconds("FNBUS_MAX_CLOCK_SKEW_SECS")?,
            enable_legacy: flag("FNBUS_ENABLE_LEGACY", defaults.enable_legacy),
            max_body_bytes: bytes("FNBUS_MAX_BODY_BYTES")?.unwrap_or(defaults.max_body_bytes),
            identity_authority: var("FNBUS_IDENTITY_AUTHORITY").filter(|v| !v.trim().is_empty()),
            identity_enable_caching: flag(
                "FNBUS_IDENTITY_ENABLE_CACHING",
                defaults.identity_enable_caching,
            ),
            identity_cache_ttl: seconds("FNBUS_IDENTITY_CACHE_TTL_SECS")?
                .unwrap_or(defaults.identity_cache_ttl),
        })
    }

    /// Guard settings derived from this configuration.
    #[must_use]
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            validator: ValidatorConfig {
                lookup_timeout: self.lookup_timeout,
                max_clock_skew: self.max_clock_skew,
            },
            enable_legacy: self.enable_legacy,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "TRUE" | "YES")
}
