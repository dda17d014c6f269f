//! Stateless trigger for an outbound telephony call.
//!
//! This is a single fire-and-forget HTTP call, entirely outside the session
//! protocol: no session state is read or written and nothing is retried.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One dial-out destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialoutSettings {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    #[serde(rename = "callerId", skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
}

/// Body of the `POST /start` trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialoutRequest {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "callId")]
    pub call_id: String,
    #[serde(rename = "callDomain")]
    pub call_domain: String,
    pub dialout_settings: Vec<DialoutSettings>,
}

/// Fires the dial-out trigger at `{base_url}/start`.
///
/// A non-2xx response is reported as a connection error with the status and
/// body; there is no further outcome to observe.
pub async fn trigger_dialout(
    http: &reqwest::Client,
    base_url: &str,
    request: &DialoutRequest,
) -> Result<(), ClientError> {
    let url = format!("{}/start", base_url.trim_end_matches('/'));
    let response = http
        .post(&url)
        .json(request)
        .send()
        .await
        .map_err(|e| ClientError::Connection {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Connection {
            status: Some(status.as_u16()),
            message: body,
        });
    }
    info!(%url, to = %request.to, "dial-out triggered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_with_webhook_field_names() {
        let request = DialoutRequest {
            from: "+15550001111".to_string(),
            to: "+15550002222".to_string(),
            call_id: "c-1".to_string(),
            call_domain: "example.daily.co".to_string(),
            dialout_settings: vec![DialoutSettings {
                phone_number: "+15550002222".to_string(),
                caller_id: Some("+15550001111".to_string()),
            }],
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "From": "+15550001111",
                "To": "+15550002222",
                "callId": "c-1",
                "callDomain": "example.daily.co",
                "dialout_settings": [
                    { "phoneNumber": "+15550002222", "callerId": "+15550001111" }
                ],
            })
        );
    }

    #[test]
    fn test_caller_id_is_optional() {
        let settings = DialoutSettings {
            phone_number: "+15550002222".to_string(),
            caller_id: None,
        };
        let wire = serde_json::to_value(&settings).unwrap();
        assert_eq!(wire, json!({ "phoneNumber": "+15550002222" }));
    }

    #[test]
    fn test_request_round_trip() {
        let raw = json!({
            "From": "+1555",
            "To": "+1666",
            "callId": "abc",
            "callDomain": "d.daily.co",
            "dialout_settings": [{ "phoneNumber": "+1666" }],
        });
        let request: DialoutRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.call_id, "abc");
        assert_eq!(request.dialout_settings[0].caller_id, None);
    }
}
