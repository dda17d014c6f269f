//! JSON-over-WebSocket media transport.
//!
//! Speaks a small tagged wire protocol on the session's data path: the client
//! joins with its token, then exchanges application messages while the server
//! streams lifecycle, track, and transcript events. Media negotiation happens
//! out of band; this adapter carries only the event/data path.

use super::{
    MediaTransport, SessionState, TransportCredentials, TransportEvent, TransportFactory,
};
use crate::error::ClientError;
use crate::event::AppPayload;
use crate::model::{MediaKind, Participant, Track};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{error, info, warn};

/// Commands sent from the client to the session endpoint.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireCommand {
    /// Authenticates and joins the session. Must be the first frame.
    Join { token: String },
    /// An application-defined message for the remote agent.
    AppMessage { data: Value },
    /// Announces an orderly departure before closing.
    Leave,
}

/// Events streamed by the session endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    /// The remote agent is ready for application traffic.
    BotReady,
    ParticipantJoined {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        local: bool,
    },
    ParticipantLeft {
        id: String,
    },
    TrackStarted {
        id: String,
        participant_id: String,
        kind: MediaKind,
    },
    TrackStopped {
        id: String,
    },
    UserTranscript {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    BotTranscript {
        text: String,
    },
    /// Opaque application payload; validated downstream at the adapter.
    ServerMessage {
        data: Value,
    },
    Error {
        message: String,
    },
}

fn map_wire_event(event: WireEvent) -> TransportEvent {
    match event {
        WireEvent::BotReady => TransportEvent::StateChanged(SessionState::Ready),
        WireEvent::ParticipantJoined { id, name, local } => {
            TransportEvent::ParticipantJoined(Participant { id, name, local })
        }
        WireEvent::ParticipantLeft { id } => TransportEvent::ParticipantLeft(id),
        WireEvent::TrackStarted {
            id,
            participant_id,
            kind,
        } => TransportEvent::TrackStarted(Track {
            id,
            participant_id,
            kind,
            active: true,
        }),
        WireEvent::TrackStopped { id } => TransportEvent::TrackStopped(id),
        WireEvent::UserTranscript { text, is_final } => {
            TransportEvent::UserTranscript { text, is_final }
        }
        WireEvent::BotTranscript { text } => TransportEvent::BotTranscript { text },
        WireEvent::ServerMessage { data } => TransportEvent::AppMessage(match data {
            Value::String(text) => AppPayload::Text(text),
            other => AppPayload::Json(other),
        }),
        WireEvent::Error { message } => TransportEvent::Error(message),
    }
}

/// A [`MediaTransport`] over a single WebSocket connection.
pub struct WebSocketTransport {
    credentials: TransportCredentials,
    outbound: Mutex<Option<mpsc::UnboundedSender<WireCommand>>>,
}

impl WebSocketTransport {
    pub fn new(credentials: TransportCredentials) -> Self {
        Self {
            credentials,
            outbound: Mutex::new(None),
        }
    }

    /// Session URL mapped onto the WebSocket scheme.
    fn endpoint(&self) -> Result<String, ClientError> {
        let url = &self.credentials.session_url;
        if url.starts_with("ws://") || url.starts_with("wss://") {
            Ok(url.clone())
        } else if let Some(rest) = url.strip_prefix("https://") {
            Ok(format!("wss://{rest}"))
        } else if let Some(rest) = url.strip_prefix("http://") {
            Ok(format!("ws://{rest}"))
        } else {
            Err(ClientError::Transport(format!(
                "unsupported session url scheme: {url}"
            )))
        }
    }
}

#[async_trait]
impl MediaTransport for WebSocketTransport {
    async fn start(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), ClientError> {
        let endpoint = self.endpoint()?;
        let _ = events.send(TransportEvent::StateChanged(SessionState::Connecting));

        let mut request = endpoint
            .clone()
            .into_client_request()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.credentials.token)
                .parse()
                .map_err(|_| {
                    ClientError::Transport("token is not a valid header value".to_string())
                })?,
        );

        let (stream, _) = connect_async(request).await.map_err(|e| {
            ClientError::Transport(format!("failed to connect to {endpoint}: {e}"))
        })?;
        info!(%endpoint, "connected to session endpoint");
        let (mut sink, mut inbound) = stream.split();

        let join = serde_json::to_string(&WireCommand::Join {
            token: self.credentials.token.clone(),
        })
        .map_err(|e| ClientError::Transport(e.to_string()))?;
        sink.send(WsMessage::Text(join.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let _ = events.send(TransportEvent::StateChanged(SessionState::Connected));

        let (tx, mut rx) = mpsc::unbounded_channel::<WireCommand>();
        *self.outbound.lock().await = Some(tx);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(command) => {
                            let frame = match serde_json::to_string(&command) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    error!(%e, "failed to serialize outbound frame");
                                    continue;
                                }
                            };
                            let leaving = matches!(command, WireCommand::Leave);
                            if leaving {
                                let _ = events.send(TransportEvent::StateChanged(
                                    SessionState::Disconnecting,
                                ));
                            }
                            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                                break;
                            }
                            if leaving {
                                let _ = sink.close().await;
                                break;
                            }
                        }
                        None => break,
                    },
                    frame = inbound.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<WireEvent>(&text) {
                                Ok(event) => {
                                    let _ = events.send(map_wire_event(event));
                                }
                                Err(e) => warn!(%e, "ignoring unrecognized wire frame"),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = events.send(TransportEvent::Error(format!(
                                "websocket error: {e}"
                            )));
                            break;
                        }
                    },
                }
            }
            let _ = events.send(TransportEvent::StateChanged(SessionState::Disconnecting));
            let _ = events.send(TransportEvent::StateChanged(SessionState::Disconnected));
        });
        Ok(())
    }

    async fn send_app_message(&self, payload: Value) -> Result<(), ClientError> {
        let guard = self.outbound.lock().await;
        let sender = guard
            .as_ref()
            .ok_or_else(|| ClientError::Transport("transport is not started".to_string()))?;
        sender
            .send(WireCommand::AppMessage { data: payload })
            .map_err(|_| ClientError::Transport("transport task has shut down".to_string()))
    }

    async fn stop(&self) -> Result<(), ClientError> {
        let sender = self.outbound.lock().await.take();
        if let Some(sender) = sender {
            let _ = sender.send(WireCommand::Leave);
        }
        Ok(())
    }
}

/// Factory producing [`WebSocketTransport`]s for discovered sessions.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransportFactory;

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn create(
        &self,
        credentials: TransportCredentials,
    ) -> Result<Arc<dyn MediaTransport>, ClientError> {
        Ok(Arc::new(WebSocketTransport::new(credentials)))
    }
}
