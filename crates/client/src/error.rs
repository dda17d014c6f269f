//! Error taxonomy for the session client.

use crate::transport::SessionState;

/// Failures surfaced by session operations.
///
/// Every variant carries plain strings so a failure can also travel through
/// the event router as a cloneable error event.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// A connect attempt is already in flight.
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,
    /// The session is already connected.
    #[error("the session is already connected")]
    AlreadyConnected,
    /// The operation requires the `Ready` state.
    #[error("the session is not ready (current state: {0})")]
    NotReady(SessionState),
    /// The discovery call failed at the HTTP layer, timed out, or returned a
    /// non-2xx status. Recoverable by connecting again.
    #[error("discovery request failed: {message}")]
    Connection {
        status: Option<u16>,
        message: String,
    },
    /// The discovery call succeeded but its body was not a usable payload.
    #[error("malformed discovery response: {0}")]
    Protocol(String),
    /// An inbound server message payload could not be deserialized. The
    /// message is dropped; this error only reaches the error event category.
    #[error("malformed server message payload: {0}")]
    Deserialization(String),
    /// The media transport failed to start, send, or stop.
    #[error("transport failure: {0}")]
    Transport(String),
}
