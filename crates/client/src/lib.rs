//! Parley Client Library
//!
//! A client for driving real-time audio/video sessions with a remote
//! conversational agent. The crate covers the session/event protocol:
//! the discovery call, the transport-driven session state machine, the typed
//! event router, the outbound control channel, and a debug sink of ordered
//! event summaries. The media stack itself lives behind the
//! [`transport::MediaTransport`] seam; a JSON-over-WebSocket data-path
//! adapter ships in [`transport::websocket`].

pub mod config;
pub mod control;
pub mod debug_log;
pub mod dialout;
mod discovery;
pub mod error;
pub mod event;
pub mod model;
pub mod router;
pub mod session;
pub mod transport;

pub use config::{ConfigError, ConnectConfig};
pub use control::{ControlChannel, ControlMessage};
pub use debug_log::DebugSink;
pub use dialout::{DialoutRequest, DialoutSettings, trigger_dialout};
pub use error::ClientError;
pub use event::{AppPayload, EventCategory, ServerMessage, SessionEvent};
pub use model::{
    LogEntry, MediaKind, Participant, ParticipantId, SpeakerRole, Track, TrackId, Transcript,
};
pub use router::{EventRouter, Subscription};
pub use session::SessionManager;
pub use transport::websocket::{WebSocketTransport, WebSocketTransportFactory};
pub use transport::{
    MediaTransport, SessionState, TransportAdapter, TransportCredentials, TransportEvent,
    TransportFactory,
};
