//! Logging setup for park tooling

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ParkError, Result};

/// How the park console reports what lots are doing
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Floor applied on top of `RUST_LOG`
    pub level: Level,
    /// One JSON object per line instead of the plain format
    pub json: bool,
    /// Name reported once the subscriber is up
    pub app_name: String,
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            json: false,
            app_name: app_name.into(),
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Install the global subscriber on stderr. Fails if one is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ParkError::config(format!("Failed to install logger: {}", e)))?;
    tracing::debug!("Logging initialised for {}", config.app_name);
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| ParkError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_console_config() {
        let plain = LoggingConfig::new(Level::WARN, "park-console");
        assert!(!plain.json);
        assert_eq!(plain.level, Level::WARN);

        let json = plain.with_json(true);
        assert!(json.json);
        assert_eq!(json.app_name, "park-console");
    }
}
