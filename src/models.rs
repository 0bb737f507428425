//! Wire types for the inbound Alertmanager webhook and the outbound DingTalk
//! robot API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Key/value pairs attached to alerts and alert groups.
pub type KeyValues = BTreeMap<String, String>;

/// Whether an alert (or the whole group) is currently firing or resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// The alert-group payload posted by Alertmanager's webhook receiver.
///
/// Only `status` is mandatory; every other field falls back to an empty
/// value so templates can always reference it. The decoded JSON object is
/// kept in `raw` so the body can be passed on without losing fields this
/// type does not model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessage {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub group_key: String,
    #[serde(default)]
    pub truncated_alerts: u64,
    pub status: AlertStatus,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub group_labels: KeyValues,
    #[serde(default)]
    pub common_labels: KeyValues,
    #[serde(default)]
    pub common_annotations: KeyValues,
    #[serde(default, rename = "externalURL")]
    pub external_url: String,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

/// A single alert inside a [`WebhookMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub status: AlertStatus,
    #[serde(default)]
    pub labels: KeyValues,
    #[serde(default)]
    pub annotations: KeyValues,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
    #[serde(default)]
    pub fingerprint: String,
}

/// Reasons an inbound body is rejected before any rendering happens.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("cannot decode prometheus webhook JSON request: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebhookMessage {
    /// Decodes a raw request body, which must be a JSON object.
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let raw: Map<String, Value> = serde_json::from_slice(body)?;
        let mut message: WebhookMessage = serde_json::from_value(Value::Object(raw.clone()))?;
        message.raw = raw;
        Ok(message)
    }

    /// Alerts that are still firing.
    pub fn firing(&self) -> impl Iterator<Item = &Alert> {
        self.alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Firing)
    }
}

/// Markdown message accepted by the DingTalk robot API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DingTalkNotification {
    #[serde(rename = "msgtype")]
    pub message_type: String,
    pub markdown: Markdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<At>,
}

impl DingTalkNotification {
    pub fn markdown(title: String, text: String) -> Self {
        Self {
            message_type: "markdown".to_string(),
            markdown: Markdown { title, text },
            at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Markdown {
    pub title: String,
    pub text: String,
}

/// Who the robot should mention alongside the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct At {
    #[serde(rename = "atMobiles", default, skip_serializing_if = "Vec::is_empty")]
    pub at_mobiles: Vec<String>,
    #[serde(rename = "isAtAll")]
    pub is_at_all: bool,
}

/// The envelope every DingTalk robot call answers with.
///
/// A response that decodes fine can still carry a non-zero error code; the
/// caller has to look at it.
#[must_use = "a robot response may carry a non-zero error code"]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotResponse {
    #[serde(rename = "errcode")]
    pub error_code: i64,
    #[serde(rename = "errmsg", default)]
    pub error_message: String,
}

impl RobotResponse {
    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }
}
