//! # Park-Core
//!
//! Call parking for RVoIP.
//!
//! A call is parked into a named lot and picked up again either by slot
//! ("01".."99") or, with no slot given, longest waiting first.
//!
//! This crate provides:
//! - [`ParkingLot`]: slot allocation and release for one lot
//! - [`ParkRegistry`]: named lots created on first use
//! - [`ParkEventBus`]: park/unpark notifications and inbound park requests
//! - [`ParkableSession`]: what parking needs from a call leg
//!
//! ## Example
//!
//! ```rust
//! use rvoip_park_core::{LocalSession, ParkConfig, ParkEvent, ParkRegistry};
//!
//! let registry = ParkRegistry::new(ParkConfig::default());
//! registry.on("log", |event: &ParkEvent| println!("{:?}", event.kind()));
//!
//! let call = registry.park(LocalSession::new("1000"), "sales").unwrap();
//! assert_eq!(call.record.slot.to_string(), "01");
//!
//! let resumed = registry.unpark("sales", None).unwrap();
//! assert!(!resumed.record.parked);
//! ```
//!
//! Media and signaling stay outside: parking calls `detach`, `unmix` and
//! `play` on the session and audio traits and leaves the rest to the
//! session layer.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod lot;
pub mod registry;
pub mod session;
pub mod types;

pub use config::ParkConfig;
pub use error::{ParkError, Result};
pub use events::{
    ParkEvent, ParkEventBus, ParkEventHandler, ParkEventKind, ParkRequest, ParkRequestSink,
};
pub use lot::ParkingLot;
pub use registry::ParkRegistry;
pub use session::{
    AudioChannel, LifecycleHandler, ListenerId, LocalSession, ParkableSession, SessionLifecycle,
};
pub use types::{
    CallerIdentity, HoldTreatment, LotStats, ParkRecord, ParkSearch, ParkedBy, ParkedCall,
    ReleaseReason, SessionId, Slot, MAX_SLOTS,
};
