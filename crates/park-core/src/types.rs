//! Core parking types
//!
//! Identifiers and value records shared by lots, the registry and the event bus.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParkError;
use crate::session::ParkableSession;

/// Highest slot number a lot can hand out (slots are two decimal digits)
pub const MAX_SLOTS: u8 = 99;

/// Unique identifier of a session leg
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A parking position within one lot, shown as "01".."99"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot(u8);

impl Slot {
    /// Create a slot from its number. Returns `None` outside 1..=99.
    pub fn new(number: u8) -> Option<Self> {
        (1..=MAX_SLOTS).contains(&number).then_some(Self(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Slot {
    type Err = ParkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(Slot::new)
            .ok_or_else(|| ParkError::InvalidSlot(trimmed.to_string()))
    }
}

impl TryFrom<String> for Slot {
    type Error = ParkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

/// Caller identity of a leg (the remote party as seen by the switch)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// User part, e.g. an extension number
    pub user: String,
    /// Display name
    pub name: String,
}

impl CallerIdentity {
    pub fn new(user: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            name: name.into(),
        }
    }
}

/// The party that performed a park
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkedBy {
    pub id: SessionId,
    pub identity: CallerIdentity,
}

/// Parking details attached to a parked session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkRecord {
    /// Lot the session was parked in
    pub lot: String,
    /// Assigned slot
    pub slot: Slot,
    /// Occupied size of the lot when this record was created or last released
    pub count: usize,
    /// Who parked the session
    pub parked_by: ParkedBy,
    /// True while the session occupies `slot`
    pub parked: bool,
    /// When the session was parked
    pub parked_at: DateTime<Utc>,
}

impl ParkRecord {
    /// Time spent in the lot so far
    pub fn wait_time(&self) -> chrono::Duration {
        Utc::now() - self.parked_at
    }
}

/// What a hold treatment plays to a parked leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HoldTreatment {
    /// Nothing is played
    Silence,
    /// Ringback tone
    Ringback,
    /// Music on hold from a named source
    MusicOnHold { source: String },
}

impl Default for HoldTreatment {
    fn default() -> Self {
        HoldTreatment::MusicOnHold {
            source: "default".to_string(),
        }
    }
}

/// A parked session together with its parking record
#[derive(Clone)]
pub struct ParkedCall {
    pub session: Arc<dyn ParkableSession>,
    pub record: ParkRecord,
}

impl ParkedCall {
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn slot(&self) -> Slot {
        self.record.slot
    }
}

impl fmt::Debug for ParkedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParkedCall")
            .field("session", &self.session.id())
            .field("record", &self.record)
            .finish()
    }
}

/// Lookup criteria for `find`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParkSearch {
    /// Match the caller-identity user of the party that parked the call
    ParkedBy(String),
    /// Match the parked session itself
    Session(SessionId),
}

/// Why a slot was released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseReason {
    /// Unparked by slot
    Explicit,
    /// Blind unpark of the longest waiting call
    Oldest,
    /// The parked leg hung up
    Terminated,
    /// The parked leg was picked up through another path
    RetrievedElsewhere,
}

impl ReleaseReason {
    pub fn is_automatic(&self) -> bool {
        matches!(self, ReleaseReason::Terminated | ReleaseReason::RetrievedElsewhere)
    }
}

/// Snapshot of a lot's occupancy and counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotStats {
    pub name: String,
    pub capacity: u8,
    pub parked: usize,
    pub available: usize,
    pub total_parked: u64,
    pub total_released: u64,
    pub auto_released: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_formatting() {
        assert_eq!(Slot::new(1).unwrap().to_string(), "01");
        assert_eq!(Slot::new(42).unwrap().to_string(), "42");
        assert_eq!(Slot::new(99).unwrap().to_string(), "99");
    }

    #[test]
    fn test_slot_range() {
        assert!(Slot::new(0).is_none());
        assert!(Slot::new(100).is_none());
    }

    #[test]
    fn test_slot_parsing() {
        assert_eq!("07".parse::<Slot>().unwrap(), Slot::new(7).unwrap());
        assert_eq!("7".parse::<Slot>().unwrap(), Slot::new(7).unwrap());
        assert!(matches!("00".parse::<Slot>(), Err(ParkError::InvalidSlot(_))));
        assert!(matches!("abc".parse::<Slot>(), Err(ParkError::InvalidSlot(_))));
    }

    #[test]
    fn test_slot_serde_as_string() {
        let slot = Slot::new(3).unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"03\"");
        let back: Slot = serde_json::from_str("\"03\"").unwrap();
        assert_eq!(back, slot);
    }

    #[test]
    fn test_release_reason_automatic() {
        assert!(ReleaseReason::Terminated.is_automatic());
        assert!(ReleaseReason::RetrievedElsewhere.is_automatic());
        assert!(!ReleaseReason::Explicit.is_automatic());
        assert!(!ReleaseReason::Oldest.is_automatic());
    }
}
