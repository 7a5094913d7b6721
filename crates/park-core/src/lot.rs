//! Parking lot
//!
//! A lot owns a closed pool of slots and the calls currently parked in it.
//! Slots are always handed out lowest-first; parked calls are kept in the
//! order they arrived, which is the order blind unpark releases them in.
//!
//! A parked leg is watched for termination and for being picked up
//! elsewhere. Either one frees its slot through the same release path as an
//! explicit unpark.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info};

use crate::config::ParkConfig;
use crate::error::{ParkError, Result};
use crate::events::{ParkEvent, ParkEventBus};
use crate::session::{ListenerId, ParkableSession, SessionLifecycle};
use crate::types::{
    HoldTreatment, LotStats, ParkRecord, ParkSearch, ParkedBy, ParkedCall, ReleaseReason, Slot,
};

/// A named parking lot. Cloning shares the same lot.
#[derive(Clone)]
pub struct ParkingLot {
    shared: Arc<LotShared>,
}

struct LotShared {
    name: String,
    capacity: u8,
    hold_treatment: HoldTreatment,
    bus: ParkEventBus,
    /// Held while a park or release is announced. Always taken before `state`.
    announce: ReentrantMutex<()>,
    state: Mutex<LotState>,
}

struct LotState {
    /// Free slots, iterated in ascending order
    available: BTreeSet<Slot>,
    /// Occupied slots in park order
    parked: Vec<ParkedEntry>,
    next_ticket: u64,
    counters: LotCounters,
}

#[derive(Debug, Default)]
struct LotCounters {
    total_parked: u64,
    total_released: u64,
    auto_released: u64,
    rejected: u64,
}

struct ParkedEntry {
    /// Identifies this occupancy; a reused slot gets a new ticket
    ticket: u64,
    session: Arc<dyn ParkableSession>,
    record: ParkRecord,
    listeners: Vec<(SessionLifecycle, ListenerId)>,
}

impl ParkedEntry {
    fn to_call(&self) -> ParkedCall {
        ParkedCall {
            session: self.session.clone(),
            record: self.record.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ReleaseTarget {
    Slot(Slot),
    Oldest,
    Ticket(u64),
}

impl ParkingLot {
    /// Create an empty lot publishing on `bus`
    pub fn new(name: impl Into<String>, config: &ParkConfig, bus: ParkEventBus) -> Self {
        let available = (1..=config.lot_capacity).filter_map(Slot::new).collect::<BTreeSet<_>>();
        let capacity = available.len() as u8;

        Self {
            shared: Arc::new(LotShared {
                name: name.into(),
                capacity,
                hold_treatment: config.hold_treatment.clone(),
                bus,
                announce: ReentrantMutex::new(()),
                state: Mutex::new(LotState {
                    available,
                    parked: Vec::new(),
                    next_ticket: 1,
                    counters: LotCounters::default(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> u8 {
        self.shared.capacity
    }

    /// Number of parked calls
    pub fn len(&self) -> usize {
        self.shared.state.lock().parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().parked.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.state.lock().available.is_empty()
    }

    /// Free slots in the order they will be handed out
    pub fn available_slots(&self) -> Vec<Slot> {
        self.shared.state.lock().available.iter().copied().collect()
    }

    /// Park a session. Returns `None` when the lot is full.
    pub fn park(&self, session: Arc<dyn ParkableSession>) -> Option<ParkedCall> {
        self.try_park(session).ok()
    }

    /// Park a session.
    ///
    /// If the session has a companion leg, the companion is parked and the
    /// session is recorded as the parker. Otherwise the session parks itself.
    pub fn try_park(&self, session: Arc<dyn ParkableSession>) -> Result<ParkedCall> {
        let shared = &self.shared;

        // Reserved up front so nothing can fill the lot once media is touched
        let slot = {
            let mut state = shared.state.lock();
            match state.available.pop_first() {
                Some(slot) => slot,
                None => {
                    state.counters.rejected += 1;
                    debug!("Parking lot '{}' is full, rejecting {}", shared.name, session.id());
                    return Err(ParkError::lot_full(&shared.name));
                }
            }
        };

        let companion = session.other();
        let parked_by = ParkedBy {
            id: session.id(),
            identity: session.identity(),
        };

        // The parker is fully detached before the parked leg goes on hold
        shared.prepare_media(session.as_ref(), companion.as_deref());

        let target = companion.unwrap_or(session);

        let (call, ticket) = {
            let _announce = shared.announce.lock();

            let (call, ticket) = {
                let mut state = shared.state.lock();
                let ticket = state.next_ticket;
                state.next_ticket += 1;

                let record = ParkRecord {
                    lot: shared.name.clone(),
                    slot,
                    count: state.parked.len() + 1,
                    parked_by,
                    parked: true,
                    parked_at: Utc::now(),
                };

                state.parked.push(ParkedEntry {
                    ticket,
                    session: target.clone(),
                    record: record.clone(),
                    listeners: Vec::new(),
                });
                state.counters.total_parked += 1;

                debug!("Allocated slot {} in lot '{}' (ticket {})", slot, shared.name, ticket);
                (
                    ParkedCall {
                        session: target.clone(),
                        record,
                    },
                    ticket,
                )
            };

            target.park_record_updated(&call.record);

            info!(
                "Parked {} in lot '{}' slot {} (parked by {})",
                target.id(),
                shared.name,
                call.record.slot,
                call.record.parked_by.identity.user
            );
            shared.bus.publish(ParkEvent::Parked { call: call.clone() });
            (call, ticket)
        };

        // A notification raised from here on releases through the usual path,
        // which announces after the Parked event above
        let listeners = self.watch(target.as_ref(), ticket);
        let stale = {
            let mut state = shared.state.lock();
            match state.parked.iter_mut().find(|e| e.ticket == ticket) {
                Some(entry) => {
                    entry.listeners = listeners;
                    None
                }
                None => Some(listeners),
            }
        };
        if let Some(listeners) = stale {
            debug!("{} left lot '{}' while subscribing", target.id(), shared.name);
            unwatch(target.as_ref(), listeners);
        }

        Ok(call)
    }

    /// Unpark by slot, or the longest waiting call when `slot` is `None`
    pub fn unpark(&self, slot: Option<Slot>) -> Option<ParkedCall> {
        self.try_unpark(slot).ok()
    }

    pub fn try_unpark(&self, slot: Option<Slot>) -> Result<ParkedCall> {
        match slot {
            Some(slot) => self
                .shared
                .release(ReleaseTarget::Slot(slot), ReleaseReason::Explicit),
            None => self
                .shared
                .release(ReleaseTarget::Oldest, ReleaseReason::Oldest),
        }
    }

    /// First parked call matching `criteria`, in park order
    pub fn find(&self, criteria: &ParkSearch) -> Option<ParkedCall> {
        self.try_find(criteria).ok()
    }

    pub fn try_find(&self, criteria: &ParkSearch) -> Result<ParkedCall> {
        let state = self.shared.state.lock();
        state
            .parked
            .iter()
            .find(|entry| match criteria {
                ParkSearch::ParkedBy(user) => entry.record.parked_by.identity.user == *user,
                ParkSearch::Session(id) => entry.session.id() == *id,
            })
            .map(ParkedEntry::to_call)
            .ok_or_else(|| ParkError::not_found(&self.shared.name, format!("{:?}", criteria)))
    }

    /// Snapshot of every parked call in park order
    pub fn get(&self) -> Vec<ParkedCall> {
        self.shared
            .state
            .lock()
            .parked
            .iter()
            .map(ParkedEntry::to_call)
            .collect()
    }

    pub fn stats(&self) -> LotStats {
        let state = self.shared.state.lock();
        LotStats {
            name: self.shared.name.clone(),
            capacity: self.shared.capacity,
            parked: state.parked.len(),
            available: state.available.len(),
            total_parked: state.counters.total_parked,
            total_released: state.counters.total_released,
            auto_released: state.counters.auto_released,
            rejected: state.counters.rejected,
        }
    }

    /// Subscribe to the leg's lifecycle so its slot is freed if it goes away
    fn watch(&self, session: &dyn ParkableSession, ticket: u64) -> Vec<(SessionLifecycle, ListenerId)> {
        SessionLifecycle::ALL
            .iter()
            .map(|&event| {
                let lot: Weak<LotShared> = Arc::downgrade(&self.shared);
                let id = session.on(
                    event,
                    Arc::new(move |fired: SessionLifecycle| {
                        if let Some(lot) = lot.upgrade() {
                            lot.auto_release(ticket, fired);
                        }
                    }),
                );
                (event, id)
            })
            .collect()
    }
}

impl LotShared {
    fn prepare_media(&self, originator: &dyn ParkableSession, companion: Option<&dyn ParkableSession>) {
        if let Some(audio) = originator.audio() {
            audio.unmix();
        }
        originator.detach();

        if let Some(audio) = companion.and_then(|c| c.audio()) {
            audio.unmix();
            audio.play(&self.hold_treatment);
        }
    }

    fn auto_release(&self, ticket: u64, fired: SessionLifecycle) {
        let reason = match fired {
            SessionLifecycle::Terminated => ReleaseReason::Terminated,
            SessionLifecycle::RetrievedElsewhere => ReleaseReason::RetrievedElsewhere,
        };
        if let Err(e) = self.release(ReleaseTarget::Ticket(ticket), reason) {
            debug!("Ignoring {:?} for ticket {}: {}", fired, ticket, e);
        }
    }

    /// Free a slot. Every unpark path ends here.
    fn release(&self, target: ReleaseTarget, reason: ReleaseReason) -> Result<ParkedCall> {
        let _announce = self.announce.lock();

        let entry = {
            let mut state = self.state.lock();
            let pos = match target {
                ReleaseTarget::Slot(slot) => state
                    .parked
                    .iter()
                    .position(|e| e.record.slot == slot)
                    .ok_or_else(|| ParkError::not_found(&self.name, format!("slot {}", slot)))?,
                ReleaseTarget::Oldest => {
                    if state.parked.is_empty() {
                        return Err(ParkError::empty_lot(&self.name));
                    }
                    0
                }
                ReleaseTarget::Ticket(ticket) => state
                    .parked
                    .iter()
                    .position(|e| e.ticket == ticket)
                    .ok_or_else(|| ParkError::not_found(&self.name, format!("ticket {}", ticket)))?,
            };

            let mut entry = state.parked.remove(pos);
            state.available.insert(entry.record.slot);
            entry.record.count = state.parked.len();
            entry.record.parked = false;

            state.counters.total_released += 1;
            if reason.is_automatic() {
                state.counters.auto_released += 1;
            }
            entry
        };

        let ParkedEntry {
            session,
            record,
            listeners,
            ..
        } = entry;

        unwatch(session.as_ref(), listeners);
        session.park_record_updated(&record);

        info!(
            "Unparked {} from lot '{}' slot {} ({:?})",
            session.id(),
            self.name,
            record.slot,
            reason
        );

        let call = ParkedCall { session, record };
        self.bus.publish(ParkEvent::Unparked {
            call: call.clone(),
            reason,
        });
        Ok(call)
    }
}

fn unwatch(session: &dyn ParkableSession, listeners: Vec<(SessionLifecycle, ListenerId)>) {
    for (event, id) in listeners {
        session.off(event, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LocalSession;

    fn lot_with_capacity(capacity: u8) -> ParkingLot {
        let config = ParkConfig::default().with_lot_capacity(capacity);
        ParkingLot::new("test", &config, ParkEventBus::default())
    }

    fn slot(n: u8) -> Slot {
        Slot::new(n).unwrap()
    }

    #[test]
    fn test_sequential_allocation() {
        let lot = lot_with_capacity(99);
        for n in 1..=99u8 {
            let call = lot.park(LocalSession::new("1000")).unwrap();
            assert_eq!(call.record.slot, slot(n));
            assert_eq!(call.record.slot.to_string(), format!("{:02}", n));
            assert_eq!(call.record.count, n as usize);
        }
        assert!(lot.is_full());
        assert!(lot.available_slots().is_empty());
    }

    #[test]
    fn test_full_lot_rejects_without_touching_media() {
        let lot = lot_with_capacity(1);
        lot.park(LocalSession::new("1000")).unwrap();

        let (a, _b) = LocalSession::bridged("2000", "3000");
        assert_eq!(
            lot.try_park(a.clone()).unwrap_err(),
            ParkError::lot_full("test")
        );
        assert!(a.journal().is_empty());
        assert_eq!(lot.len(), 1);
        assert_eq!(lot.stats().rejected, 1);
    }

    #[test]
    fn test_lowest_slot_reused_first() {
        let lot = lot_with_capacity(99);
        for _ in 0..7 {
            lot.park(LocalSession::new("1000")).unwrap();
        }
        lot.unpark(Some(slot(7))).unwrap();
        lot.unpark(Some(slot(2))).unwrap();
        lot.unpark(Some(slot(5))).unwrap();

        assert_eq!(lot.available_slots()[..3], [slot(2), slot(5), slot(7)]);
        assert_eq!(lot.park(LocalSession::new("1000")).unwrap().record.slot, slot(2));
        assert_eq!(lot.park(LocalSession::new("1000")).unwrap().record.slot, slot(5));
    }

    #[test]
    fn test_release_updates_record() {
        let lot = lot_with_capacity(99);
        let a = LocalSession::new("1000");
        lot.park(a.clone()).unwrap();
        lot.park(LocalSession::new("1001")).unwrap();

        let released = lot.unpark(Some(slot(1))).unwrap();
        assert!(!released.record.parked);
        assert_eq!(released.record.count, 1);

        let pushed = a.park_record().unwrap();
        assert!(!pushed.parked);
        assert_eq!(pushed.slot, slot(1));
    }

    #[test]
    fn test_unpark_outcomes() {
        let lot = lot_with_capacity(99);
        assert_eq!(lot.try_unpark(None).unwrap_err(), ParkError::empty_lot("test"));
        assert!(matches!(
            lot.try_unpark(Some(slot(3))),
            Err(ParkError::NotFound { .. })
        ));
    }

    #[test]
    fn test_stale_listener_ignores_reused_slot() {
        let lot = lot_with_capacity(99);
        let a = LocalSession::new("1000");
        lot.park(a.clone()).unwrap();

        assert_eq!(lot.shared.state.lock().parked[0].listeners.len(), 2);
        let stale_ticket = lot.shared.state.lock().parked[0].ticket;

        lot.unpark(Some(slot(1))).unwrap();
        assert_eq!(a.listener_count(), 0);

        let b = LocalSession::new("1001");
        assert_eq!(lot.park(b.clone()).unwrap().record.slot, slot(1));

        // A late notification for the old occupancy must not free b's slot
        lot.shared.auto_release(stale_ticket, SessionLifecycle::Terminated);
        assert_eq!(lot.len(), 1);
        assert_eq!(lot.get()[0].session_id(), b.id());
    }

    #[test]
    fn test_stats_counters() {
        let lot = lot_with_capacity(3);
        let a = LocalSession::new("1000");
        lot.park(a.clone()).unwrap();
        lot.park(LocalSession::new("1001")).unwrap();
        lot.unpark(None).unwrap();
        lot.park(LocalSession::new("1002")).unwrap();

        let stats = lot.stats();
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.parked, 2);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.total_parked, 3);
        assert_eq!(stats.total_released, 1);
        assert_eq!(stats.auto_released, 0);
    }
}
