//! The discovery call: exchanges a connection request for transport
//! credentials.

use crate::config::ConnectConfig;
use crate::error::ClientError;
use crate::transport::TransportCredentials;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Body of the discovery POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest<'a> {
    create_room: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_properties: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_data: Option<&'a Value>,
}

/// Performs the discovery POST and validates the response shape.
///
/// Network failures, timeouts, and non-2xx statuses are
/// [`ClientError::Connection`]; a 2xx body without both `room_url` and
/// `token` is a [`ClientError::Protocol`] and no transport may be started.
pub(crate) async fn fetch_credentials(
    http: &reqwest::Client,
    config: &ConnectConfig,
) -> Result<TransportCredentials, ClientError> {
    let url = config.connect_url();
    let body = ConnectRequest {
        create_room: config.create_room,
        room_properties: config.room_properties.as_ref(),
        request_data: config.request_data.as_ref(),
    };

    let mut request = http
        .post(&url)
        .timeout(config.discovery_timeout)
        .json(&body);
    if let Some(token) = &config.api_token {
        request = request.bearer_auth(token);
    }

    debug!(%url, "issuing discovery request");
    let response = request.send().await.map_err(|e| ClientError::Connection {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| ClientError::Connection {
        status: Some(status.as_u16()),
        message: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(ClientError::Connection {
            status: Some(status.as_u16()),
            message: text,
        });
    }

    parse_response(&text)
}

/// Extracts `room_url` and `token` from a 2xx discovery body.
pub(crate) fn parse_response(body: &str) -> Result<TransportCredentials, ClientError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ClientError::Protocol(format!("response is not valid JSON: {e}")))?;

    let session_url = value
        .get("room_url")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Protocol("response is missing `room_url`".to_string()))?;
    let token = value
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Protocol("response is missing `token`".to_string()))?;

    Ok(TransportCredentials {
        session_url: session_url.to_string(),
        token: token.to_string(),
    })
}
