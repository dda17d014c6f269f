//! Outbound control messages to the remote agent.

use crate::error::ClientError;
use crate::event::ServerMessage;
use crate::transport::{MediaTransport, SessionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// An application-defined message carried on the transport's data path,
/// distinct from media tracks.
///
/// The discriminator is always `"custom"` on the wire. Only the application
/// constructs these; the transport never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub id: String,
    #[serde(rename = "type")]
    kind: String,
    pub label: String,
    pub data: Value,
}

impl ControlMessage {
    /// Builds a message with a fresh id.
    pub fn new(label: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: "custom".to_string(),
            label: label.into(),
            data,
        }
    }

    /// Whether an inbound server message correlates with this one, by id or
    /// by label when the reply carries no id.
    ///
    /// The channel itself guarantees no reply; correlation is purely an
    /// application convenience.
    pub fn matches_reply(&self, reply: &ServerMessage) -> bool {
        match reply {
            ServerMessage::Reply { id: Some(id), .. } => *id == self.id,
            ServerMessage::Reply { id: None, label, .. } => *label == self.label,
            ServerMessage::Unrecognized(_) => false,
        }
    }
}

/// Fire-and-forget sender for [`ControlMessage`]s.
///
/// Sending requires the `Ready` state; there is no acknowledgment, no retry,
/// and no queueing — a message sent too early is rejected, not buffered.
pub struct ControlChannel {
    transport: Arc<dyn MediaTransport>,
    state: watch::Receiver<SessionState>,
}

impl fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlChannel")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ControlChannel {
    pub(crate) fn new(
        transport: Arc<dyn MediaTransport>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self { transport, state }
    }

    /// Transmits one message over the transport's outbound data path.
    pub async fn send(&self, message: &ControlMessage) -> Result<(), ClientError> {
        let state = *self.state.borrow();
        if state != SessionState::Ready {
            return Err(ClientError::NotReady(state));
        }
        let payload = serde_json::to_value(message)
            .map_err(|e| ClientError::Transport(format!("failed to encode message: {e}")))?;
        self.transport.send_app_message(payload).await
    }
}
