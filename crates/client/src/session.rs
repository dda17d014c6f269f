//! Session lifecycle orchestration: discovery, transport attach, teardown.

use crate::config::ConnectConfig;
use crate::control::ControlChannel;
use crate::discovery;
use crate::error::ClientError;
use crate::router::EventRouter;
use crate::transport::{SessionState, TransportAdapter, TransportFactory};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Bound on how long a started transport may take to leave the initial state.
const TRANSPORT_START_GRACE: Duration = Duration::from_secs(10);

struct ActiveSession {
    id: Uuid,
    adapter: Arc<TransportAdapter>,
}

/// Owns the one live session of a client runtime.
///
/// `connect` performs the discovery call, builds a transport from the
/// injected factory, and starts the adapter; `disconnect` tears everything
/// down and is always safe to repeat. The manager never changes session state
/// itself — it only observes what the adapter reports.
pub struct SessionManager {
    config: ConnectConfig,
    http: reqwest::Client,
    router: Arc<EventRouter>,
    factory: Arc<dyn TransportFactory>,
    state: Arc<watch::Sender<SessionState>>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
    connecting: AtomicBool,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(config: ConnectConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            http: reqwest::Client::new(),
            router: Arc::new(EventRouter::new()),
            factory,
            state: Arc::new(state),
            active: tokio::sync::Mutex::new(None),
            connecting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// The router carrying this session's events.
    pub fn router(&self) -> Arc<EventRouter> {
        Arc::clone(&self.router)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch handle for state observation.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identity of the active session, if any.
    pub async fn session_id(&self) -> Option<Uuid> {
        self.active.lock().await.as_ref().map(|active| active.id)
    }

    /// Establishes a session.
    ///
    /// Fails with [`ClientError::AlreadyConnecting`] or
    /// [`ClientError::AlreadyConnected`] instead of issuing a second
    /// discovery request, and returns once the transport has at least begun
    /// connecting — readiness arrives later on the event stream.
    pub async fn connect(&self) -> Result<(), ClientError> {
        match self.state() {
            SessionState::Connected | SessionState::Ready => {
                return Err(ClientError::AlreadyConnected);
            }
            SessionState::Connecting | SessionState::Disconnecting => {
                return Err(ClientError::AlreadyConnecting);
            }
            SessionState::Disconnected | SessionState::Error => {}
        }
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::AlreadyConnecting);
        }

        let result = self.connect_inner().await;
        self.connecting.store(false, Ordering::SeqCst);
        result
    }

    async fn connect_inner(&self) -> Result<(), ClientError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let credentials = discovery::fetch_credentials(&self.http, &self.config).await?;

        // A disconnect issued while discovery was in flight wins: the result
        // is discarded and no transport is started.
        if self.generation.load(Ordering::SeqCst) != generation {
            info!("discarding discovery result: disconnect was requested meanwhile");
            return Err(ClientError::Connection {
                status: None,
                message: "session was disconnected during discovery".to_string(),
            });
        }

        let transport = self.factory.create(credentials).await?;
        let adapter = Arc::new(TransportAdapter::new(
            transport,
            Arc::clone(&self.state),
            Arc::clone(&self.router),
        ));
        Arc::clone(&adapter).start().await?;

        let mut state_rx = self.state.subscribe();
        let outcome = tokio::time::timeout(
            TRANSPORT_START_GRACE,
            state_rx.wait_for(|s| *s != SessionState::Disconnected),
        )
        .await
        .map(|result| result.map(|state| *state));
        let reached = match outcome {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => {
                return Err(ClientError::Transport("state channel closed".to_string()));
            }
            Err(_) => {
                let _ = adapter.shutdown().await;
                return Err(ClientError::Transport(
                    "transport never began connecting".to_string(),
                ));
            }
        };
        if reached == SessionState::Error {
            let _ = adapter.shutdown().await;
            return Err(ClientError::Transport(
                "transport failed while connecting".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        info!(session = %id, state = %reached, "session established");
        *self.active.lock().await = Some(ActiveSession { id, adapter });
        Ok(())
    }

    /// Tears down the active session.
    ///
    /// Calling with no active session, or repeatedly, is a no-op and never an
    /// error.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let active = self.active.lock().await.take();
        let Some(active) = active else {
            return Ok(());
        };
        info!(session = %active.id, "disconnecting session");
        active.adapter.shutdown().await
    }

    /// Control channel bound to the current transport.
    ///
    /// Errors with the current state while no transport exists; the returned
    /// channel itself still requires `Ready` at every send.
    pub async fn control_channel(&self) -> Result<ControlChannel, ClientError> {
        let guard = self.active.lock().await;
        let active = guard
            .as_ref()
            .ok_or_else(|| ClientError::NotReady(self.state()))?;
        Ok(ControlChannel::new(
            active.adapter.transport(),
            self.state.subscribe(),
        ))
    }
}
