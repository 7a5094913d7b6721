//! Error types for park-core

use thiserror::Error;

/// Result type alias for parking operations
pub type Result<T> = std::result::Result<T, ParkError>;

/// Reasons a parking operation produced no result
///
/// The lot-level outcomes (`LotFull`, `NotFound`, `EmptyLot`) are ordinary
/// conditions. The plain `park`/`unpark`/`find` calls report them as `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParkError {
    /// Every slot in the lot is occupied
    #[error("Parking lot '{lot}' is full")]
    LotFull { lot: String },

    /// No parked call matched the slot, lot or search
    #[error("No parked call in lot '{lot}' for {target}")]
    NotFound { lot: String, target: String },

    /// Blind unpark against a lot with nothing parked
    #[error("Parking lot '{lot}' is empty")]
    EmptyLot { lot: String },

    /// Slot text was not a number in 1..=99
    #[error("Invalid parking slot: {0}")]
    InvalidSlot(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors while loading configuration
    #[error("IO error: {0}")]
    Io(String),
}

impl ParkError {
    pub fn lot_full(lot: impl Into<String>) -> Self {
        Self::LotFull { lot: lot.into() }
    }

    pub fn not_found(lot: impl Into<String>, target: impl Into<String>) -> Self {
        Self::NotFound {
            lot: lot.into(),
            target: target.into(),
        }
    }

    pub fn empty_lot(lot: impl Into<String>) -> Self {
        Self::EmptyLot { lot: lot.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the normal "nothing there" outcomes of lot operations
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            ParkError::LotFull { .. } | ParkError::NotFound { .. } | ParkError::EmptyLot { .. }
        )
    }
}

impl From<std::io::Error> for ParkError {
    fn from(err: std::io::Error) -> Self {
        ParkError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_outcomes() {
        assert!(ParkError::lot_full("sales").is_absent());
        assert!(ParkError::empty_lot("sales").is_absent());
        assert!(ParkError::not_found("sales", "slot 03").is_absent());

        assert!(!ParkError::config("bad capacity").is_absent());
        assert!(!ParkError::InvalidSlot("00".into()).is_absent());
        assert!(!ParkError::from(std::io::Error::other("disk")).is_absent());
    }

    #[test]
    fn test_display() {
        assert_eq!(ParkError::lot_full("sales").to_string(), "Parking lot 'sales' is full");
        assert_eq!(
            ParkError::not_found("sales", "slot 03").to_string(),
            "No parked call in lot 'sales' for slot 03"
        );
    }
}
