//! Delivery of notifications to DingTalk robot webhooks.

use crate::config::Target;
use crate::models::{DingTalkNotification, RobotResponse};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Transport-level failures. A robot that answers with a non-zero error code
/// is not one of these; see [`RobotResponse::is_success`].
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("invalid signing secret")]
    InvalidSecret,
    #[error("error sending notification: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unacceptable response code {0}")]
    Status(StatusCode),
    #[error("error decoding robot response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Posts `notification` to the target robot and decodes its response envelope.
#[instrument(skip_all, fields(target = %target.name))]
pub async fn send_notification(
    notification: &DingTalkNotification,
    client: &reqwest::Client,
    target: &Target,
) -> Result<RobotResponse, DispatchError> {
    let url = signed_url(target, Utc::now().timestamp_millis())?;

    let response = client.post(url).json(notification).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(DispatchError::Status(status));
    }

    let robot_response: RobotResponse = response.json().await.map_err(DispatchError::Decode)?;
    debug!(
        code = robot_response.error_code,
        message = %robot_response.error_message,
        "Robot responded"
    );
    Ok(robot_response)
}

/// The target URL, with `timestamp` and `sign` query parameters added when
/// the target has a signing secret.
pub fn signed_url(target: &Target, timestamp_ms: i64) -> Result<Url, DispatchError> {
    let mut url = target.url.clone();
    let Some(secret) = target.secret.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(url);
    };

    let timestamp = timestamp_ms.to_string();
    let sign = sign(secret, &timestamp)?;

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "timestamp" && key != "sign")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("timestamp", &timestamp)
        .append_pair("sign", &sign);

    Ok(url)
}

/// base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")), as the robot API
/// expects it.
pub fn sign(secret: &str, timestamp: &str) -> Result<String, DispatchError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| DispatchError::InvalidSecret)?;
    mac.update(format!("{}\n{}", timestamp, secret).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
