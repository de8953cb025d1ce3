//! Typed publish/subscribe surface for session events.
//!
//! Listeners are plain synchronous callbacks. They run on the session's driver
//! task, in registration order, one event at a time, so every listener sees
//! events in the order the frames arrived.

use bytes::Bytes;
use gemini_live_types::{Content, ToolCall};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Event names, used to pick which events a listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    SetupComplete,
    Content,
    Audio,
    ToolCall,
    ToolCallCancellation,
    TurnComplete,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The transport is open and the setup frame has been sent.
    Open,
    /// The connection ended, either by `disconnect` or by the peer.
    Close { code: u16, reason: String },
    /// A user-visible failure. See [`FailureKind`] for which ones end the session.
    Error(SessionFailure),
    /// The endpoint acknowledged the setup frame.
    SetupComplete,
    /// Model output other than PCM audio, forwarded verbatim.
    Content(Content),
    /// Raw PCM16 audio from the model.
    Audio(Bytes),
    /// A batch of function calls. The tool registry answers it; listeners only observe.
    ToolCall(ToolCall),
    /// Ids of calls the model no longer needs answered.
    ToolCallCancellation(Vec<String>),
    TurnComplete,
    Interrupted,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Open => EventKind::Open,
            SessionEvent::Close { .. } => EventKind::Close,
            SessionEvent::Error(_) => EventKind::Error,
            SessionEvent::SetupComplete => EventKind::SetupComplete,
            SessionEvent::Content(_) => EventKind::Content,
            SessionEvent::Audio(_) => EventKind::Audio,
            SessionEvent::ToolCall(_) => EventKind::ToolCall,
            SessionEvent::ToolCallCancellation(_) => EventKind::ToolCallCancellation,
            SessionEvent::TurnComplete => EventKind::TurnComplete,
            SessionEvent::Interrupted => EventKind::Interrupted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transport failed to open or dropped. The session is `Errored`.
    Connection,
    /// An inbound frame could not be decoded. It was dropped; the session continues.
    MalformedFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SessionFailure {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Connection,
            message: message.into(),
        }
    }

    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::MalformedFrame,
            message: message.into(),
        }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Connection => write!(f, "connection error: {}", self.message),
            FailureKind::MalformedFrame => write!(f, "malformed frame: {}", self.message),
        }
    }
}

/// Handle returned by [`EventBus::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Entry {
    id: ListenerId,
    /// `None` receives every event.
    kind: Option<EventKind>,
    listener: Listener,
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(listener))
    }

    /// Registers `listener` for every event.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Number of listeners that would receive an event of `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|e| e.kind.is_none_or(|k| k == kind))
            .count()
    }

    /// Delivers `event` to every matching listener, in registration order.
    ///
    /// The listener list is snapshotted first: listeners added or removed
    /// while the event is being delivered take effect from the next event.
    /// A panicking listener is logged and does not stop delivery to the rest.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .iter()
                .filter(|e| e.kind.is_none_or(|k| k == kind))
                .map(|e| e.listener.clone())
                .collect()
        };

        for listener in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(?kind, "Session event listener panicked");
            }
        }
    }

    fn add(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry { id, kind, listener });
        id
    }
}
