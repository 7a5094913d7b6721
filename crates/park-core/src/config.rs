//! Configuration for park-core

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ParkError, Result};
use crate::types::{HoldTreatment, MAX_SLOTS};

/// Default number of buffered events per broadcast subscriber
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkConfig {
    /// Slots per lot, at most 99
    pub lot_capacity: u8,
    /// Treatment played to a parked companion leg
    pub hold_treatment: HoldTreatment,
    /// Buffer size of the broadcast event channel
    pub event_channel_capacity: usize,
}

impl Default for ParkConfig {
    fn default() -> Self {
        Self {
            lot_capacity: MAX_SLOTS,
            hold_treatment: HoldTreatment::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ParkConfig {
    /// Set the number of slots per lot
    pub fn with_lot_capacity(mut self, capacity: u8) -> Self {
        self.lot_capacity = capacity;
        self
    }

    /// Set the hold treatment
    pub fn with_hold_treatment(mut self, treatment: HoldTreatment) -> Self {
        self.hold_treatment = treatment;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.lot_capacity == 0 || self.lot_capacity > MAX_SLOTS {
            return Err(ParkError::config(format!(
                "lot_capacity must be between 1 and {}, got {}",
                MAX_SLOTS, self.lot_capacity
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(ParkError::config("event_channel_capacity must be positive"));
        }
        Ok(())
    }

    /// Load configuration from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents)
                .map_err(|e| ParkError::config(format!("{}: {}", path.display(), e)))?,
            Some("json") => serde_json::from_str(&contents)
                .map_err(|e| ParkError::config(format!("{}: {}", path.display(), e)))?,
            _ => {
                return Err(ParkError::config(format!(
                    "Unsupported config format: {}",
                    path.display()
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// - `RVOIP_PARK_CAPACITY`: slots per lot
    /// - `RVOIP_PARK_HOLD`: `silence`, `ringback`, or a music-on-hold source name
    /// - `RVOIP_PARK_EVENT_CAPACITY`: broadcast buffer size
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("RVOIP_PARK_CAPACITY") {
            config.lot_capacity = value
                .trim()
                .parse()
                .map_err(|_| ParkError::config(format!("Invalid RVOIP_PARK_CAPACITY: {}", value)))?;
        }

        if let Some(value) = lookup("RVOIP_PARK_HOLD") {
            config.hold_treatment = match value.trim() {
                "silence" => HoldTreatment::Silence,
                "ringback" => HoldTreatment::Ringback,
                source => HoldTreatment::MusicOnHold {
                    source: source.to_string(),
                },
            };
        }

        if let Some(value) = lookup("RVOIP_PARK_EVENT_CAPACITY") {
            config.event_channel_capacity = value.trim().parse().map_err(|_| {
                ParkError::config(format!("Invalid RVOIP_PARK_EVENT_CAPACITY: {}", value))
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ParkConfig::default();
        assert_eq!(config.lot_capacity, 99);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(ParkConfig::default().with_lot_capacity(0).validate().is_err());
        assert!(ParkConfig::default().with_lot_capacity(100).validate().is_err());
        assert!(ParkConfig::default().with_lot_capacity(1).validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let config: ParkConfig = toml::from_str(
            r#"
            lot_capacity = 10

            [hold_treatment]
            type = "music_on_hold"
            source = "jazz"
            "#,
        )
        .unwrap();

        assert_eq!(config.lot_capacity, 10);
        assert_eq!(
            config.hold_treatment,
            HoldTreatment::MusicOnHold {
                source: "jazz".to_string()
            }
        );
        // Unset fields keep their defaults
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_from_file_json() {
        let path = std::env::temp_dir().join(format!("park-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "lot_capacity": 5, "hold_treatment": { "type": "ringback" } }"#)
            .unwrap();

        let config = ParkConfig::from_file(&path).unwrap();
        assert_eq!(config.lot_capacity, 5);
        assert_eq!(config.hold_treatment, HoldTreatment::Ringback);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_file_rejects_unknown_format() {
        let err = ParkConfig::from_file("/nonexistent/park.yaml").unwrap_err();
        assert!(matches!(err, ParkError::Io(_)));

        let path = std::env::temp_dir().join(format!("park-config-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "lot_capacity: 5").unwrap();
        let err = ParkConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ParkError::Config(_)));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            ("RVOIP_PARK_CAPACITY", "20"),
            ("RVOIP_PARK_HOLD", "silence"),
        ]);
        let config = ParkConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.lot_capacity, 20);
        assert_eq!(config.hold_treatment, HoldTreatment::Silence);

        let bad = HashMap::from([("RVOIP_PARK_CAPACITY", "lots")]);
        assert!(ParkConfig::from_lookup(|k| bad.get(k).map(|v| v.to_string())).is_err());
    }
}
