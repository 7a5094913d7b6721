//! In-memory session leg
//!
//! `LocalSession` implements [`ParkableSession`] without any signaling or
//! media underneath. Media operations are written to a journal so callers can
//! see what parking asked of each leg. The console tool and the test suite
//! both run on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::{AudioChannel, LifecycleHandler, ListenerId, ParkableSession, SessionLifecycle};
use crate::types::{CallerIdentity, HoldTreatment, ParkRecord, SessionId};

/// A media operation performed on a leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOp {
    Unmix,
    Play(HoldTreatment),
    Detach,
}

/// One journal line: which leg, what happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAction {
    pub session: SessionId,
    pub op: MediaOp,
}

/// Journal shared between the legs of one call
pub type MediaJournal = Arc<Mutex<Vec<MediaAction>>>;

struct LocalAudio {
    session: SessionId,
    journal: MediaJournal,
}

impl AudioChannel for LocalAudio {
    fn unmix(&self) {
        self.journal.lock().push(MediaAction {
            session: self.session.clone(),
            op: MediaOp::Unmix,
        });
    }

    fn play(&self, treatment: &HoldTreatment) {
        self.journal.lock().push(MediaAction {
            session: self.session.clone(),
            op: MediaOp::Play(treatment.clone()),
        });
    }
}

/// In-memory [`ParkableSession`]
pub struct LocalSession {
    id: SessionId,
    identity: RwLock<CallerIdentity>,
    other: RwLock<Option<Weak<LocalSession>>>,
    audio: Option<Arc<LocalAudio>>,
    journal: MediaJournal,
    listeners: Mutex<HashMap<SessionLifecycle, Vec<(ListenerId, LifecycleHandler)>>>,
    next_listener: AtomicU64,
    park_record: RwLock<Option<ParkRecord>>,
}

impl LocalSession {
    fn build(user: &str, audio: bool, journal: MediaJournal) -> Arc<Self> {
        let id = SessionId::new();
        let audio = audio.then(|| {
            Arc::new(LocalAudio {
                session: id.clone(),
                journal: journal.clone(),
            })
        });
        Arc::new(Self {
            id,
            identity: RwLock::new(CallerIdentity::new(user, "")),
            other: RwLock::new(None),
            audio,
            journal,
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            park_record: RwLock::new(None),
        })
    }

    /// A single leg without audio
    pub fn new(user: &str) -> Arc<Self> {
        Self::build(user, false, MediaJournal::default())
    }

    /// A single leg with an audio channel
    pub fn with_audio(user: &str) -> Arc<Self> {
        Self::build(user, true, MediaJournal::default())
    }

    /// Two bridged legs with audio sharing one journal.
    ///
    /// Returns `(originator, companion)`; parking the originator parks the
    /// companion.
    pub fn bridged(originator: &str, companion: &str) -> (Arc<Self>, Arc<Self>) {
        let journal = MediaJournal::default();
        let a = Self::build(originator, true, journal.clone());
        let b = Self::build(companion, true, journal);
        Self::link(&a, &b);
        (a, b)
    }

    /// Link two legs as companions of each other
    pub fn link(a: &Arc<Self>, b: &Arc<Self>) {
        *a.other.write() = Some(Arc::downgrade(b));
        *b.other.write() = Some(Arc::downgrade(a));
    }

    /// Drop the companion link on this leg only
    pub fn unlink(&self) {
        *self.other.write() = None;
    }

    pub fn set_display_name(&self, name: &str) {
        self.identity.write().name = name.to_string();
    }

    /// The most recent park record pushed to this leg
    pub fn park_record(&self) -> Option<ParkRecord> {
        self.park_record.read().clone()
    }

    /// Media operations recorded so far, in order
    pub fn journal(&self) -> Vec<MediaAction> {
        self.journal.lock().clone()
    }

    /// Number of registered lifecycle listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    /// Raise the termination notification
    pub fn hangup(&self) {
        self.fire(SessionLifecycle::Terminated);
    }

    /// Raise the picked-up-elsewhere notification
    pub fn retrieve_elsewhere(&self) {
        self.fire(SessionLifecycle::RetrievedElsewhere);
    }

    /// Invoke every listener for `event`.
    ///
    /// Handlers are cloned out first so they may call `off` on this leg.
    pub fn fire(&self, event: SessionLifecycle) {
        let handlers: Vec<LifecycleHandler> = self
            .listeners
            .lock()
            .get(&event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(event);
        }
    }
}

impl ParkableSession for LocalSession {
    fn id(&self) -> SessionId {
        self.id.clone()
    }

    fn identity(&self) -> CallerIdentity {
        self.identity.read().clone()
    }

    fn other(&self) -> Option<Arc<dyn ParkableSession>> {
        let other = self.other.read().as_ref().and_then(Weak::upgrade)?;
        Some(other as Arc<dyn ParkableSession>)
    }

    fn audio(&self) -> Option<Arc<dyn AudioChannel>> {
        self.audio
            .clone()
            .map(|audio| audio as Arc<dyn AudioChannel>)
    }

    fn detach(&self) {
        self.journal.lock().push(MediaAction {
            session: self.id.clone(),
            op: MediaOp::Detach,
        });
    }

    fn on(&self, event: SessionLifecycle, handler: LifecycleHandler) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, event: SessionLifecycle, id: ListenerId) {
        if let Some(list) = self.listeners.lock().get_mut(&event) {
            list.retain(|(listener, _)| *listener != id);
        }
    }

    fn park_record_updated(&self, record: &ParkRecord) {
        *self.park_record.write() = Some(record.clone());
    }
}
