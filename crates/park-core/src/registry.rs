//! Park registry
//!
//! Owns every named lot, creating a lot the first time a call is parked in
//! it. Lots are never removed; an emptied lot keeps its full capacity.
//!
//! Park requests arrive two ways: direct calls to [`ParkRegistry::park`] and
//! [`ParkRequest`]s delivered over the shared [`ParkEventBus`] (or an mpsc
//! channel via [`ParkRegistry::spawn_request_listener`]). Both end in `park`.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ParkConfig;
use crate::error::{ParkError, Result};
use crate::events::{ParkEvent, ParkEventBus, ParkEventHandler, ParkRequest, ParkRequestSink};
use crate::lot::ParkingLot;
use crate::session::ParkableSession;
use crate::types::{LotStats, ParkSearch, ParkedCall, Slot};

/// Registry of named parking lots
pub struct ParkRegistry {
    lots: DashMap<String, ParkingLot>,
    bus: ParkEventBus,
    config: ParkConfig,
}

impl ParkRegistry {
    /// Create a registry with its own event bus
    pub fn new(config: ParkConfig) -> Arc<Self> {
        let bus = ParkEventBus::new(config.event_channel_capacity);
        Self::with_bus(config, bus)
    }

    /// Create a registry on a shared event bus and attach it as the bus's
    /// park request sink
    pub fn with_bus(config: ParkConfig, bus: ParkEventBus) -> Arc<Self> {
        let registry = Arc::new(Self {
            lots: DashMap::new(),
            bus,
            config,
        });

        let sink: Arc<dyn ParkRequestSink> = registry.clone();
        let sink: Weak<dyn ParkRequestSink> = Arc::downgrade(&sink);
        registry.bus.set_request_sink(sink);

        registry
    }

    pub fn config(&self) -> &ParkConfig {
        &self.config
    }

    /// The bus this registry publishes on
    pub fn bus(&self) -> &ParkEventBus {
        &self.bus
    }

    /// Get a lot, creating it if it doesn't exist yet
    pub fn get_or_create_lot(&self, name: &str) -> ParkingLot {
        if let Some(lot) = self.lots.get(name) {
            return lot.value().clone();
        }

        self.lots
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Creating parking lot '{}'", name);
                ParkingLot::new(name, &self.config, self.bus.clone())
            })
            .value()
            .clone()
    }

    /// An existing lot
    pub fn lot(&self, name: &str) -> Option<ParkingLot> {
        self.lots.get(name).map(|lot| lot.value().clone())
    }

    /// Names of every lot created so far
    pub fn lot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lots.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Park a session in `lot`. Returns `None` when the lot is full.
    pub fn park(&self, session: Arc<dyn ParkableSession>, lot: &str) -> Option<ParkedCall> {
        self.try_park(session, lot).ok()
    }

    pub fn try_park(&self, session: Arc<dyn ParkableSession>, lot: &str) -> Result<ParkedCall> {
        self.get_or_create_lot(lot).try_park(session)
    }

    /// Unpark by slot, or the longest waiting call when `slot` is `None`.
    /// Returns `None` for a lot that was never used.
    pub fn unpark(&self, lot: &str, slot: Option<Slot>) -> Option<ParkedCall> {
        self.try_unpark(lot, slot).ok()
    }

    pub fn try_unpark(&self, lot: &str, slot: Option<Slot>) -> Result<ParkedCall> {
        self.existing(lot)?.try_unpark(slot)
    }

    pub fn find(&self, lot: &str, criteria: &ParkSearch) -> Option<ParkedCall> {
        self.try_find(lot, criteria).ok()
    }

    pub fn try_find(&self, lot: &str, criteria: &ParkSearch) -> Result<ParkedCall> {
        self.existing(lot)?.try_find(criteria)
    }

    /// Parked calls in `lot` in park order; empty for a lot never used
    pub fn get(&self, lot: &str) -> Vec<ParkedCall> {
        self.lot(lot).map(|l| l.get()).unwrap_or_default()
    }

    /// Stats for every lot, ordered by name
    pub fn stats(&self) -> Vec<LotStats> {
        let mut stats: Vec<LotStats> = self.lots.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Calls parked across all lots
    pub fn total_parked(&self) -> usize {
        self.lots.iter().map(|e| e.value().len()).sum()
    }

    /// Register a named event handler
    pub fn add_event_handler(&self, name: &str, handler: Arc<dyn ParkEventHandler>) {
        self.bus.add_event_handler(name, handler);
    }

    /// Register a closure as a named event handler
    pub fn on<F>(&self, name: &str, handler: F)
    where
        F: Fn(&ParkEvent) + Send + Sync + 'static,
    {
        self.bus.add_event_handler(name, Arc::new(handler));
    }

    pub fn remove_event_handler(&self, name: &str) -> bool {
        self.bus.remove_event_handler(name)
    }

    /// Receive events asynchronously
    pub fn subscribe(&self) -> broadcast::Receiver<ParkEvent> {
        self.bus.subscribe()
    }

    /// Park every request received on `requests` until the channel closes
    pub fn spawn_request_listener(
        self: &Arc<Self>,
        mut requests: mpsc::Receiver<ParkRequest>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let Some(registry) = weak.upgrade() else {
                    debug!("Park registry dropped, stopping request listener");
                    break;
                };
                registry.handle_park_request(request);
            }
        })
    }

    fn existing(&self, lot: &str) -> Result<ParkingLot> {
        self.lot(lot)
            .ok_or_else(|| ParkError::not_found(lot, "unknown lot"))
    }
}

impl ParkRequestSink for ParkRegistry {
    fn handle_park_request(&self, request: ParkRequest) -> Option<ParkedCall> {
        let session_id = request.session.id();
        match self.try_park(request.session, &request.lot) {
            Ok(call) => Some(call),
            Err(e) if e.is_absent() => {
                info!("Park request for {} rejected: {}", session_id, e);
                None
            }
            Err(e) => {
                warn!("Park request for {} failed: {}", session_id, e);
                None
            }
        }
    }
}
