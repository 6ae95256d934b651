use reqwest::Url;
use thiserror::Error;

use crate::model::UserIdentity;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const BASE_URL_ENV: &str = "ITINERARY_API_BASE_URL";
pub const USER_ID_ENV: &str = "ITINERARY_USER_ID";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

// Client configuration, fixed for the lifetime of a session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_id: UserIdentity,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: UserIdentity::default(),
        }
    }
}

impl ClientConfig {
    // Reads overrides from the environment, falling back to the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var(BASE_URL_ENV).unwrap_or(defaults.base_url),
            user_id: std::env::var(USER_ID_ENV)
                .map(UserIdentity::new)
                .unwrap_or(defaults.user_id),
        }
    }

    pub fn validate(&self) -> Result<Url, ClientError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::ConfigError(format!("invalid base url {:?}: {}", self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::ConfigError(format!(
                "unsupported scheme {:?} in base url",
                url.scheme()
            )));
        }

        if self.user_id.as_str().trim().is_empty() {
            return Err(ClientError::ConfigError("user id must not be blank".to_string()));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        let url = config.validate().unwrap();
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port(), Some(5000));
        assert_eq!(config.user_id.as_str(), "default_user");
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::ConfigError(_))));

        let config = ClientConfig {
            base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::ConfigError(_))));

        let config = ClientConfig {
            user_id: UserIdentity::new("  "),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::ConfigError(_))));
    }
}
