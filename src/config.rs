use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Default number of participants admitted per room.
const DEFAULT_ROOM_CAPACITY: usize = 2;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum participants admitted per room
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config.sanitized())
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// A room must admit at least one participant.
    fn sanitized(mut self) -> Self {
        if self.room_capacity == 0 {
            warn!(
                "Invalid room capacity 0, falling back to {}",
                DEFAULT_ROOM_CAPACITY
            );
            self.room_capacity = DEFAULT_ROOM_CAPACITY;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            room_capacity: default_room_capacity(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_room_capacity() -> usize {
    DEFAULT_ROOM_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_two_party() {
        let config = Config::default();
        assert_eq!(config.room_capacity, 2);
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert!(config.is_development());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = Config {
            room_capacity: 0,
            ..Config::default()
        };
        assert_eq!(config.sanitized().room_capacity, 2);
    }
}
