//! Domain records derived from the session's event history.

use crate::event::EventCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a participant by the transport.
pub type ParticipantId = String;

/// Identifier assigned to a media track by the transport.
pub type TrackId = String;

/// One party in the session: the local client or the remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: Option<String>,
    /// True for the local participant, false for the remote agent.
    pub local: bool,
}

impl Participant {
    /// Display name, falling back to the transport-assigned id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// One media stream owned by a participant.
///
/// Tracks exist only between their started and stopped events and always
/// reference a participant known at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub participant_id: ParticipantId,
    pub kind: MediaKind,
    pub active: bool,
}

/// Who produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Bot,
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakerRole::User => write!(f, "user"),
            SpeakerRole::Bot => write!(f, "bot"),
        }
    }
}

/// Text produced from spoken audio by either party.
///
/// User transcripts may repeat as interim updates until one final record;
/// bot transcripts arrive as append-only chunks and are never final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub role: SpeakerRole,
    pub text: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl Transcript {
    /// Builds a transcript stamped with the current time.
    pub(crate) fn now(role: SpeakerRole, text: String, is_final: bool) -> Self {
        Self {
            role,
            text,
            is_final,
            timestamp: Utc::now(),
        }
    }
}

/// One rendered line in the debug sink.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Category tag for display grouping only.
    pub category: EventCategory,
}
