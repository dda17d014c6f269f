//! Media transport seam, session state machine, and the event pump.
//!
//! The actual media stack (codecs, negotiation) lives behind the
//! [`MediaTransport`] trait; this module only consumes its event stream. The
//! [`TransportAdapter`] is the sole writer of the session state and the only
//! place raw transport events become routed [`SessionEvent`]s.

use crate::error::ClientError;
use crate::event::{AppPayload, ServerMessage, SessionEvent};
use crate::model::{Participant, ParticipantId, SpeakerRole, Track, TrackId, Transcript};
use crate::router::EventRouter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

pub mod websocket;

#[cfg(test)]
use mockall::automock;

/// How long teardown waits for the transport to report a terminal state
/// before the adapter reflects it on its own.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle states of a session, in the order they are normally traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Disconnecting,
    Error,
}

impl SessionState {
    /// Whether the transport may move the session from `self` to `next`.
    ///
    /// `Disconnected` is both the initial and the terminal state; `Error` is
    /// reachable from any non-terminal state. Everything else must follow the
    /// connect chain. There is no automatic reconnection: leaving a terminal
    /// state takes a fresh connect.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnecting)
                | (Connected, Ready)
                | (Connected, Disconnecting)
                | (Ready, Disconnecting)
                | (Disconnecting, Disconnected)
                | (Connecting | Connected | Ready | Disconnecting, Error)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Ready => "ready",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Credentials returned by the discovery call.
///
/// Passed to the transport factory exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportCredentials {
    pub session_url: String,
    pub token: String,
}

/// One raw occurrence observed on the media transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(SessionState),
    ParticipantJoined(Participant),
    ParticipantLeft(ParticipantId),
    TrackStarted(Track),
    TrackStopped(TrackId),
    UserTranscript { text: String, is_final: bool },
    BotTranscript { text: String },
    AppMessage(AppPayload),
    Error(String),
}

/// The underlying real-time media/data channel.
///
/// Implementations push every observed occurrence into the sender handed to
/// [`start`](MediaTransport::start) and drop it when the connection is gone;
/// the adapter never polls. `stop` must eventually lead to the terminal
/// `Disconnected` state being emitted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Connects and begins emitting events. Called at most once.
    async fn start(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), ClientError>;

    /// Sends one application message over the data path.
    async fn send_app_message(&self, payload: serde_json::Value) -> Result<(), ClientError>;

    /// Begins an orderly teardown.
    async fn stop(&self) -> Result<(), ClientError>;
}

/// Builds a transport for freshly discovered credentials.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        credentials: TransportCredentials,
    ) -> Result<Arc<dyn MediaTransport>, ClientError>;
}

#[derive(Default)]
struct Registry {
    participants: HashMap<ParticipantId, Participant>,
    tracks: HashMap<TrackId, Track>,
}

/// Wraps a [`MediaTransport`], owning the session state machine and the pump
/// that turns raw transport events into routed [`SessionEvent`]s.
///
/// Events are processed to completion, one at a time, on a single task; the
/// adapter is the only component that may change the session state, and only
/// to reflect an observed transport event.
pub struct TransportAdapter {
    transport: Arc<dyn MediaTransport>,
    state: Arc<watch::Sender<SessionState>>,
    router: Arc<EventRouter>,
    registry: Mutex<Registry>,
    pump: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TransportAdapter {
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        state: Arc<watch::Sender<SessionState>>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            transport,
            state,
            router,
            registry: Mutex::new(Registry::default()),
            pump: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts the transport and the event pump.
    pub async fn start(self: Arc<Self>) -> Result<(), ClientError> {
        // A fresh adapter always begins from the initial state, even when the
        // previous session ended in `Error`.
        self.state.send_replace(SessionState::Disconnected);

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.transport.start(tx).await?;

        let adapter = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                adapter.handle_event(event);
            }
            debug!("transport event stream ended");
        });
        *self.pump.lock().await = Some(handle);
        Ok(())
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Handle to the wrapped transport, for the control channel.
    pub(crate) fn transport(&self) -> Arc<dyn MediaTransport> {
        Arc::clone(&self.transport)
    }

    /// Participants currently known from event history.
    pub fn participants(&self) -> Vec<Participant> {
        self.registry
            .lock()
            .unwrap()
            .participants
            .values()
            .cloned()
            .collect()
    }

    /// Tracks currently known from event history.
    pub fn tracks(&self) -> Vec<Track> {
        self.registry
            .lock()
            .unwrap()
            .tracks
            .values()
            .cloned()
            .collect()
    }

    /// Stops the transport and waits for the terminal state.
    ///
    /// If the transport never reports it, the adapter records the
    /// `Disconnected` transition itself so teardown always settles.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let result = self.transport.stop().await;

        let mut state_rx = self.state.subscribe();
        let settled = tokio::time::timeout(
            SHUTDOWN_GRACE,
            state_rx.wait_for(|s| {
                matches!(s, SessionState::Disconnected | SessionState::Error)
            }),
        )
        .await
        .map(|result| result.map(|state| *state));
        if settled.is_err() {
            warn!("transport did not report teardown; forcing disconnected state");
            let previous = *self.state.borrow();
            if previous != SessionState::Disconnected {
                self.state.send_replace(SessionState::Disconnected);
                self.router.dispatch(&SessionEvent::StateChanged {
                    previous,
                    current: SessionState::Disconnected,
                });
            }
        }

        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
        result
    }

    /// Applies one raw transport event: updates state and registries, then
    /// dispatches exactly one routed event (or none, when the occurrence is
    /// invalid and dropped).
    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(next) => {
                let previous = *self.state.borrow();
                if previous == next {
                    return;
                }
                if !previous.can_transition_to(next) {
                    warn!(%previous, %next, "ignoring invalid session state transition");
                    return;
                }
                self.state.send_replace(next);
                self.router.dispatch(&SessionEvent::StateChanged {
                    previous,
                    current: next,
                });
            }
            TransportEvent::ParticipantJoined(participant) => {
                self.registry
                    .lock()
                    .unwrap()
                    .participants
                    .insert(participant.id.clone(), participant.clone());
                self.router
                    .dispatch(&SessionEvent::ParticipantJoined(participant));
            }
            TransportEvent::ParticipantLeft(id) => {
                let participant = {
                    let mut registry = self.registry.lock().unwrap();
                    let Some(participant) = registry.participants.remove(&id) else {
                        warn!(participant = %id, "ignoring leave for unknown participant");
                        return;
                    };
                    registry.tracks.retain(|_, track| track.participant_id != id);
                    participant
                };
                self.router
                    .dispatch(&SessionEvent::ParticipantLeft(participant));
            }
            TransportEvent::TrackStarted(mut track) => {
                {
                    let mut registry = self.registry.lock().unwrap();
                    if !registry.participants.contains_key(&track.participant_id) {
                        warn!(
                            track = %track.id,
                            participant = %track.participant_id,
                            "ignoring track start for unknown participant"
                        );
                        return;
                    }
                    track.active = true;
                    registry.tracks.insert(track.id.clone(), track.clone());
                }
                self.router.dispatch(&SessionEvent::TrackStarted(track));
            }
            TransportEvent::TrackStopped(id) => {
                let removed = self.registry.lock().unwrap().tracks.remove(&id);
                let Some(mut track) = removed else {
                    warn!(track = %id, "ignoring stop for unknown track");
                    return;
                };
                track.active = false;
                self.router.dispatch(&SessionEvent::TrackStopped(track));
            }
            TransportEvent::UserTranscript { text, is_final } => {
                self.router.dispatch(&SessionEvent::UserTranscript(
                    Transcript::now(SpeakerRole::User, text, is_final),
                ));
            }
            TransportEvent::BotTranscript { text } => {
                // Bot chunks carry no completion marker on the wire.
                self.router.dispatch(&SessionEvent::BotTranscript(
                    Transcript::now(SpeakerRole::Bot, text, false),
                ));
            }
            TransportEvent::AppMessage(payload) => match ServerMessage::parse(&payload) {
                Ok(message) => self
                    .router
                    .dispatch(&SessionEvent::ServerMessage(message)),
                Err(error) => {
                    warn!(%error, "dropping malformed server message");
                    self.router.dispatch(&SessionEvent::Error(error));
                }
            },
            TransportEvent::Error(message) => {
                self.router
                    .dispatch(&SessionEvent::Error(ClientError::Transport(message)));
            }
        }
    }
}
