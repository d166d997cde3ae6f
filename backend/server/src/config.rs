use std::{
    env,
    fmt::Display,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tracing::{info, warn};

use crate::openweather::DEFAULT_BASE_URL;

const SECRETS_DIR: &str = "/run/secrets";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("DEV_AUTH_BYPASS must be false in production")]
    BypassInProduction,

    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "test" => Ok(Self::Development),
            other => Err(format!("unknown environment {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    pub cities_path: PathBuf,
    pub cache_ttl: Duration,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub use_mock_weather: bool,
    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,
    pub auth0_jwks_uri: Option<String>,
    pub dev_auth_bypass: bool,
    pub require_scope: bool,
    pub required_scope: String,
    pub roles_claim: String,
}

impl Config {
    /// Reads the process environment, falling back to the secrets mount for the API key.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_vars(|key| env::var(key).ok())?;

        if config.openweather_api_key.is_none() {
            config.openweather_api_key = read_secret(Path::new(SECRETS_DIR), "OPENWEATHER_API_KEY");
        }

        Ok(config)
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        Ok(Self {
            port: vars.try_load("PORT", "4000")?,
            environment: vars.try_load("APP_ENV", "development")?,
            cities_path: PathBuf::from(vars.or_default("CITIES_PATH", "data/cities.json")),
            cache_ttl: Duration::from_secs(vars.try_load("CACHE_TTL_SECS", "300")?),
            openweather_api_key: vars.optional("OPENWEATHER_API_KEY"),
            openweather_base_url: vars.or_default("OPENWEATHER_BASE_URL", DEFAULT_BASE_URL),
            use_mock_weather: vars.flag("USE_MOCK_WEATHER")?,
            auth0_domain: vars
                .optional("AUTH0_DOMAIN")
                .map(|domain| normalize_domain(&domain)),
            auth0_audience: vars.optional("AUTH0_AUDIENCE"),
            auth0_jwks_uri: vars.optional("AUTH0_JWKS_URI"),
            dev_auth_bypass: vars.flag("DEV_AUTH_BYPASS")?,
            require_scope: vars.flag("REQUIRE_SCOPE")?,
            required_scope: vars.or_default("REQUIRED_SCOPE", "read:weather"),
            roles_claim: vars.or_default("ROLES_CLAIM", "https://weather-app/roles"),
        })
    }

    /// Startup checks, run once before the server accepts traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production() && self.dev_auth_bypass {
            return Err(ConfigError::BypassInProduction);
        }

        if self.auth0_domain.is_some() && self.auth0_audience.is_none() {
            warn!("AUTH0_DOMAIN is set but AUTH0_AUDIENCE is not, audience will not be checked");
        }

        if self.dev_auth_bypass {
            warn!("DEV_AUTH_BYPASS=true, auth checks are relaxed for development");
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Live upstream only when a key is present and mock data is not forced.
    pub fn live_api_key(&self) -> Option<&str> {
        match (&self.openweather_api_key, self.use_mock_weather) {
            (Some(key), false) => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn jwks_uri(&self) -> Option<String> {
        let domain = self.auth0_domain.as_ref()?;

        Some(
            self.auth0_jwks_uri
                .clone()
                .unwrap_or_else(|| format!("https://{domain}/.well-known/jwks.json")),
        )
    }

    pub fn issuer(&self) -> Option<String> {
        self.auth0_domain
            .as_ref()
            .map(|domain| format!("https://{domain}/"))
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn try_load<T: FromStr>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T::Err: Display,
    {
        let value = self.optional(key).unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        });

        value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
            value,
        })
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(false);
        };

        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

fn normalize_domain(raw: &str) -> String {
    raw.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn read_secret(dir: &Path, secret_name: &str) -> Option<String> {
    read_to_string(dir.join(secret_name))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{Config, ConfigError, Environment, read_secret};

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.required_scope, "read:weather");
        assert!(config.live_api_key().is_none());
        assert!(config.jwks_uri().is_none());
        assert!(!config.dev_auth_bypass);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bypass_in_production_is_fatal() {
        let config = config(&[("APP_ENV", "production"), ("DEV_AUTH_BYPASS", "true")]).unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::BypassInProduction)));
    }

    #[test]
    fn test_bypass_in_development_is_allowed() {
        let config = config(&[("DEV_AUTH_BYPASS", "TRUE")]).unwrap();

        assert!(config.dev_auth_bypass);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("DEV_AUTH_BYPASS", "maybe")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("APP_ENV", "staging")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_mock_flag_overrides_key() {
        let live = config(&[("OPENWEATHER_API_KEY", "abc")]).unwrap();
        let mocked = config(&[("OPENWEATHER_API_KEY", "abc"), ("USE_MOCK_WEATHER", "1")]).unwrap();

        assert_eq!(live.live_api_key(), Some("abc"));
        assert_eq!(mocked.live_api_key(), None);
    }

    #[test]
    fn test_provider_urls() {
        let config = config(&[("AUTH0_DOMAIN", "https://tenant.eu.auth0.com/")]).unwrap();

        assert_eq!(config.auth0_domain.as_deref(), Some("tenant.eu.auth0.com"));
        assert_eq!(
            config.jwks_uri().as_deref(),
            Some("https://tenant.eu.auth0.com/.well-known/jwks.json")
        );
        assert_eq!(config.issuer().as_deref(), Some("https://tenant.eu.auth0.com/"));
    }

    #[test]
    fn test_jwks_override() {
        let config = config(&[
            ("AUTH0_DOMAIN", "tenant.auth0.com"),
            ("AUTH0_JWKS_URI", "http://127.0.0.1:9000/jwks.json"),
        ])
        .unwrap();

        assert_eq!(config.jwks_uri().as_deref(), Some("http://127.0.0.1:9000/jwks.json"));
    }

    #[test]
    fn test_read_secret() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("OPENWEATHER_API_KEY"), "  from-file \n").unwrap();

        assert_eq!(
            read_secret(dir.path(), "OPENWEATHER_API_KEY").as_deref(),
            Some("from-file")
        );
        assert_eq!(read_secret(dir.path(), "MISSING"), None);
    }
}
