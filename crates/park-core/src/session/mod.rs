//! Session capabilities used by parking
//!
//! Parking never owns a session. It drives the leg through the
//! [`ParkableSession`] trait: detaching the parker, putting the parked leg on
//! hold and listening for the leg going away so its slot can be freed.

pub mod local;

use std::sync::Arc;

use crate::types::{CallerIdentity, HoldTreatment, ParkRecord, SessionId};

pub use local::LocalSession;

/// Lifecycle notifications a parked leg can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionLifecycle {
    /// The leg hung up or was destroyed
    Terminated,
    /// The leg was picked up through another path (e.g. directly by an agent)
    RetrievedElsewhere,
}

impl SessionLifecycle {
    pub const ALL: [SessionLifecycle; 2] = [
        SessionLifecycle::Terminated,
        SessionLifecycle::RetrievedElsewhere,
    ];
}

/// Handle returned by [`ParkableSession::on`], used to deregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked when a session raises a lifecycle notification
pub type LifecycleHandler = Arc<dyn Fn(SessionLifecycle) + Send + Sync>;

/// Audio side of a leg
pub trait AudioChannel: Send + Sync {
    /// Stop mixing this channel with anything else
    fn unmix(&self);

    /// Start playing a hold treatment
    fn play(&self, treatment: &HoldTreatment);
}

/// A communication leg that can be parked
pub trait ParkableSession: Send + Sync {
    /// Stable unique identifier
    fn id(&self) -> SessionId;

    /// Caller identity of this leg
    fn identity(&self) -> CallerIdentity;

    /// Linked companion leg, if this leg is bridged to another
    fn other(&self) -> Option<Arc<dyn ParkableSession>>;

    /// Audio channel, if the leg has one
    fn audio(&self) -> Option<Arc<dyn AudioChannel>>;

    /// Disengage this leg from whatever it is connected to
    fn detach(&self);

    /// Register a lifecycle listener
    fn on(&self, event: SessionLifecycle, handler: LifecycleHandler) -> ListenerId;

    /// Remove a listener previously returned by [`ParkableSession::on`]
    fn off(&self, event: SessionLifecycle, id: ListenerId);

    /// Called whenever the leg's park record changes (parked or released)
    fn park_record_updated(&self, _record: &ParkRecord) {}
}
