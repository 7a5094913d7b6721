// Shared helpers for park-core integration tests

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use rvoip_park_core::{ParkEvent, ParkEventHandler, ParkEventKind, ReleaseReason, Slot};

/// Records every event it sees
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ParkEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, kind: ParkEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn events(&self) -> Vec<ParkEvent> {
        self.events.lock().clone()
    }

    pub fn release_reasons(&self) -> Vec<ReleaseReason> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ParkEvent::Unparked { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect()
    }
}

impl ParkEventHandler for RecordingHandler {
    fn handle_event(&self, event: &ParkEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn slot(n: u8) -> Slot {
    Slot::new(n).unwrap()
}
