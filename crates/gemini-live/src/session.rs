//! The session handle shared by every feature.
//!
//! A [`LiveSession`] owns at most one connection at a time, the config store,
//! the tool registry and the event bus. Clones share all of it, so each
//! feature can hold its own handle to mount tools and listen for events.

use crate::config_store::{ConfigStore, LiveConfig, SetConfigOutcome};
use crate::connection::{self, Endpoint};
use crate::driver::{self, Ending, Outbound};
use crate::error::{ConnectionError, SessionError};
use crate::events::{EventBus, EventKind, ListenerId, SessionEvent, SessionFailure};
use crate::registry::{ToolHandler, ToolRegistry};
use gemini_live_types::{
    ClientContent, ClientMessage, Content, MediaChunk, RealtimeInput, ToolDeclaration,
    ToolResponse, encode,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Closed,
    Errored,
}

impl SessionState {
    fn is_live(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }
}

#[derive(Default)]
struct Link {
    state: SessionState,
    outbound: Option<UnboundedSender<Outbound>>,
    driver: Option<JoinHandle<()>>,
    /// Bumped by every connection attempt and by disconnects that abandon one,
    /// so a stale driver or handshake cannot overwrite newer state.
    generation: u64,
    /// Wakes a handshake in progress when `disconnect` abandons it.
    handshake: Option<Arc<Notify>>,
}

#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) events: EventBus,
    pub(crate) registry: ToolRegistry,
    config: Mutex<ConfigStore>,
    link: Mutex<Link>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn config(&self) -> MutexGuard<'_, ConfigStore> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn active_config(&self) -> Option<Arc<LiveConfig>> {
        self.config().active_config()
    }

    fn is_live(&self) -> bool {
        self.link().state.is_live()
    }

    /// Records the end of connection `generation` and reports it.
    pub(crate) fn finish(&self, generation: u64, ending: Ending) {
        {
            let mut link = self.link();
            if link.generation != generation {
                debug!(generation, "Ignoring the end of a superseded connection");
                return;
            }
            link.outbound = None;
            link.state = match ending {
                Ending::Closed { .. } => SessionState::Closed,
                Ending::Failed(_) => SessionState::Errored,
            };
        }
        self.config().clear_active();

        match ending {
            Ending::Closed { code, reason } => {
                info!(code, %reason, "Live session closed");
                self.events.emit(&SessionEvent::Close { code, reason });
            }
            Ending::Failed(message) => {
                error!(error = %message, "Live session failed");
                self.events
                    .emit(&SessionEvent::Error(SessionFailure::connection(message)));
            }
        }
    }

    fn fail_connect(&self, generation: u64, error: &ConnectionError) {
        {
            let mut link = self.link();
            if link.generation != generation {
                return;
            }
            link.state = SessionState::Errored;
            link.handshake = None;
        }
        self.config().clear_active();
        error!(error = %error, "Failed to open live session");
        self.events
            .emit(&SessionEvent::Error(SessionFailure::connection(error.to_string())));
    }
}

/// Handle to one live session. Cheap to clone.
#[derive(Clone, Default)]
pub struct LiveSession {
    shared: Arc<Shared>,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the connection and sends the setup frame built from the current
    /// config, which becomes the active config once that frame is written.
    ///
    /// A live connection is disconnected first. Fails with
    /// [`SessionError::NoConfig`] if no model has been configured; the state
    /// is left unchanged in that case. A transport failure moves the session
    /// to [`SessionState::Errored`] and is also reported as an `Error` event,
    /// including a handshake that outlives [`Endpoint::handshake_timeout`].
    /// A `disconnect` during the handshake ends it with
    /// [`SessionError::Superseded`].
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<(), SessionError> {
        if self.shared.is_live() {
            self.disconnect().await;
        }

        let config = self.shared.config().snapshot().ok_or(SessionError::NoConfig)?;
        let setup = encode(&ClientMessage::Setup(config.to_setup()))?;
        let abandon = Arc::new(Notify::new());
        let generation = {
            let mut link = self.shared.link();
            link.state = SessionState::Connecting;
            link.generation += 1;
            link.handshake = Some(abandon.clone());
            link.generation
        };
        info!(
            model = %config.model,
            tools = config.tool_declarations.len(),
            "Connecting live session"
        );

        let opened = tokio::select! {
            opened = connection::open(endpoint) => opened,
            _ = abandon.notified() => {
                warn!("Handshake abandoned by a concurrent disconnect");
                return Err(SessionError::Superseded);
            }
        };
        let (mut writer, reader) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                self.shared.fail_connect(generation, &e);
                return Err(e.into());
            }
        };

        if let Err(e) = writer.send(setup).await {
            self.shared.fail_connect(generation, &e);
            return Err(e.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let superseded = {
            let mut link = self.shared.link();
            if link.generation == generation {
                link.state = SessionState::Streaming;
                link.handshake = None;
                link.outbound = Some(tx.clone());
                self.shared.config().activate(config.clone());
                let span = info_span!("live_session", generation, model = %config.model);
                link.driver = Some(tokio::spawn(
                    driver::run(self.shared.clone(), generation, writer, reader, rx, tx)
                        .instrument(span),
                ));
                None
            } else {
                Some(writer)
            }
        };

        match superseded {
            None => Ok(()),
            Some(mut writer) => {
                warn!("Connection attempt abandoned by a concurrent disconnect");
                writer.close().await;
                Err(SessionError::Superseded)
            }
        }
    }

    /// Closes the connection and waits for its driver to finish.
    ///
    /// Handlers, listeners and the config are kept, so a later `connect`
    /// resumes with the same tools. Safe to call in any state.
    pub async fn disconnect(&self) {
        let (outbound, driver, generation) = {
            let mut link = self.shared.link();
            if link.state == SessionState::Connecting && link.driver.is_none() {
                link.generation += 1;
                if let Some(handshake) = link.handshake.take() {
                    handshake.notify_one();
                }
            }
            (link.outbound.take(), link.driver.take(), link.generation)
        };

        if let Some(outbound) = outbound {
            let _ = outbound.send(Outbound::Close);
        }
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                warn!(error = %e, "Live session driver ended abnormally");
            }
        }

        let mut link = self.shared.link();
        if link.generation == generation && link.state != SessionState::Idle {
            link.state = SessionState::Closed;
        }
    }

    /// Merges `config` into the session config. See [`ConfigStore::set_config`].
    ///
    /// While a connection is live the change is staged for the next connection.
    pub fn set_config(&self, config: LiveConfig) -> SetConfigOutcome {
        let live = self.shared.is_live();
        self.shared.config().set_config(config, live)
    }

    /// The config sent for the current connection.
    pub fn active_config(&self) -> Option<Arc<LiveConfig>> {
        self.shared.active_config()
    }

    /// True when config changes are waiting for the next connection.
    pub fn has_pending_config(&self) -> bool {
        self.shared.config().has_staged_changes()
    }

    /// Declares a tool and installs its handler in one step.
    pub fn register_tool(
        &self,
        declaration: ToolDeclaration,
        handler: Arc<dyn ToolHandler>,
    ) -> SetConfigOutcome {
        let live = self.shared.is_live();
        self.shared.registry.register(declaration.name.clone(), handler);
        self.shared.config().add_declarations(vec![declaration], live)
    }

    /// Removes a tool's handler and declaration. Returns whether either existed.
    pub fn unregister_tool(&self, name: &str) -> bool {
        let live = self.shared.is_live();
        let had_handler = self.shared.registry.unregister(name);
        let had_declaration = self.shared.config().remove_declaration(name, live);
        had_handler || had_declaration
    }

    pub fn send_realtime_input(&self, media_chunks: Vec<MediaChunk>) -> Result<(), SessionError> {
        self.enqueue(ClientMessage::RealtimeInput(RealtimeInput { media_chunks }))
    }

    pub fn send_client_content(
        &self,
        turns: Vec<Content>,
        turn_complete: bool,
    ) -> Result<(), SessionError> {
        self.enqueue(ClientMessage::ClientContent(ClientContent {
            turns,
            turn_complete,
        }))
    }

    /// Sends `text` as a complete user turn.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send_client_content(vec![Content::text("user", text)], true)
    }

    /// Sends a tool response directly. Calls routed through the registry are
    /// answered automatically; this is for callers answering on their own.
    pub fn send_tool_response(&self, response: ToolResponse) -> Result<(), SessionError> {
        self.enqueue(ClientMessage::ToolResponse(response))
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, listener)
    }

    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_any(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    pub fn state(&self) -> SessionState {
        self.shared.link().state
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.shared.registry
    }

    /// Frames are queued in call order and written by the connection's driver.
    fn enqueue(&self, message: ClientMessage) -> Result<(), SessionError> {
        let payload = encode(&message)?;
        let link = self.shared.link();
        match (link.state, link.outbound.as_ref()) {
            (SessionState::Streaming, Some(outbound)) => outbound
                .send(Outbound::Frame(payload))
                .map_err(|_| SessionError::NotConnected),
            _ => Err(SessionError::NotConnected),
        }
    }
}
