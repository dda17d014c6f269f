//! Typed session events and validation of inbound application messages.

use crate::error::ClientError;
use crate::model::{Participant, Track, Transcript};
use crate::transport::SessionState;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Event categories routed independently by the event router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    StateChanged,
    ParticipantJoined,
    ParticipantLeft,
    TrackStarted,
    TrackStopped,
    UserTranscript,
    BotTranscript,
    ServerMessage,
    Error,
}

impl EventCategory {
    /// Every category, in a stable order.
    pub const ALL: [EventCategory; 9] = [
        EventCategory::StateChanged,
        EventCategory::ParticipantJoined,
        EventCategory::ParticipantLeft,
        EventCategory::TrackStarted,
        EventCategory::TrackStopped,
        EventCategory::UserTranscript,
        EventCategory::BotTranscript,
        EventCategory::ServerMessage,
        EventCategory::Error,
    ];
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::StateChanged => "state-changed",
            EventCategory::ParticipantJoined => "participant-joined",
            EventCategory::ParticipantLeft => "participant-left",
            EventCategory::TrackStarted => "track-started",
            EventCategory::TrackStopped => "track-stopped",
            EventCategory::UserTranscript => "user-transcript",
            EventCategory::BotTranscript => "bot-transcript",
            EventCategory::ServerMessage => "server-message",
            EventCategory::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Raw application payload carried by the transport.
///
/// Some transports deliver text frames, others structured JSON; validation
/// into a [`ServerMessage`] happens at the adapter boundary either way.
#[derive(Debug, Clone, PartialEq)]
pub enum AppPayload {
    Text(String),
    Json(Value),
}

/// A validated inbound application message from the remote agent.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The known control-message shape, usable for reply correlation.
    Reply {
        id: Option<String>,
        label: String,
        data: Value,
    },
    /// Any other well-formed payload, preserved verbatim.
    Unrecognized(Value),
}

#[derive(Deserialize)]
struct ReplyShape {
    id: Option<String>,
    label: String,
    #[serde(default)]
    data: Value,
}

impl ServerMessage {
    /// Validates a raw payload at the ingress boundary.
    ///
    /// String payloads must parse as JSON; a parse failure is a
    /// [`ClientError::Deserialization`] and the message never reaches
    /// subscribers. Well-formed payloads that do not match the known reply
    /// shape fall back to [`ServerMessage::Unrecognized`].
    pub(crate) fn parse(payload: &AppPayload) -> Result<Self, ClientError> {
        let value = match payload {
            AppPayload::Text(raw) => serde_json::from_str::<Value>(raw).map_err(|e| {
                ClientError::Deserialization(format!("payload is not valid JSON: {e}"))
            })?,
            AppPayload::Json(value) => value.clone(),
        };
        match serde_json::from_value::<ReplyShape>(value.clone()) {
            Ok(reply) => Ok(ServerMessage::Reply {
                id: reply.id,
                label: reply.label,
                data: reply.data,
            }),
            Err(_) => Ok(ServerMessage::Unrecognized(value)),
        }
    }
}

/// One event dispatched to subscribers, in transport arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        previous: SessionState,
        current: SessionState,
    },
    ParticipantJoined(Participant),
    ParticipantLeft(Participant),
    TrackStarted(Track),
    TrackStopped(Track),
    UserTranscript(Transcript),
    BotTranscript(Transcript),
    ServerMessage(ServerMessage),
    Error(ClientError),
}

impl SessionEvent {
    /// The category this event is routed under.
    pub fn category(&self) -> EventCategory {
        match self {
            SessionEvent::StateChanged { .. } => EventCategory::StateChanged,
            SessionEvent::ParticipantJoined(_) => EventCategory::ParticipantJoined,
            SessionEvent::ParticipantLeft(_) => EventCategory::ParticipantLeft,
            SessionEvent::TrackStarted(_) => EventCategory::TrackStarted,
            SessionEvent::TrackStopped(_) => EventCategory::TrackStopped,
            SessionEvent::UserTranscript(_) => EventCategory::UserTranscript,
            SessionEvent::BotTranscript(_) => EventCategory::BotTranscript,
            SessionEvent::ServerMessage(_) => EventCategory::ServerMessage,
            SessionEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Human-readable one-line summary for the debug sink.
    pub fn summary(&self) -> String {
        match self {
            SessionEvent::StateChanged { previous, current } => {
                format!("session state: {previous} -> {current}")
            }
            SessionEvent::ParticipantJoined(p) => {
                format!("participant joined: {} ({})", p.display_name(), p.id)
            }
            SessionEvent::ParticipantLeft(p) => {
                format!("participant left: {} ({})", p.display_name(), p.id)
            }
            SessionEvent::TrackStarted(t) => {
                format!("{} track started by {}", t.kind, t.participant_id)
            }
            SessionEvent::TrackStopped(t) => {
                format!("{} track stopped by {}", t.kind, t.participant_id)
            }
            SessionEvent::UserTranscript(t) if t.is_final => {
                format!("user: {}", t.text)
            }
            SessionEvent::UserTranscript(t) => {
                format!("user (interim): {}", t.text)
            }
            SessionEvent::BotTranscript(t) => format!("bot: {}", t.text),
            SessionEvent::ServerMessage(ServerMessage::Reply { label, .. }) => {
                format!("server message: label={label}")
            }
            SessionEvent::ServerMessage(ServerMessage::Unrecognized(_)) => {
                "server message: unrecognized payload".to_string()
            }
            SessionEvent::Error(e) => format!("error: {e}"),
        }
    }
}
