//! Best-effort forwarding of the raw inbound payload to a secondary sink.
//!
//! The sink receives the Alertmanager message as it came in, plus a `source`
//! tag and the `dingtalkWebhookUrl` of the target it was relayed to. Its
//! outcome is only ever logged: [`FanoutSink::forward`] returns `()`.

use crate::config::{Config, Target};
use crate::models::WebhookMessage;
use crate::notification::outbound_client;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("error encoding prometheus webhook msg: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("error sending third api: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unacceptable response code {0}")]
    Status(StatusCode),
}

/// A configured secondary sink.
#[derive(Debug, Clone)]
pub struct FanoutSink {
    url: String,
    source: String,
    timeout: Duration,
}

impl FanoutSink {
    pub fn new(url: impl Into<String>, source: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            timeout,
        }
    }

    /// Returns `None` when no sink URL is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.fanout.url.as_deref().filter(|u| !u.is_empty())?;
        Some(Self::new(
            url,
            config.fanout.source.clone(),
            config.outbound_timeout(),
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forwards the message and logs the outcome. Never fails.
    pub async fn forward(&self, message: &WebhookMessage, target: &Target) {
        match self.try_forward(message, target).await {
            Ok(()) => {
                metrics::counter!("dingrelay_fanout_total", "outcome" => "success").increment(1);
                debug!(sink = %self.url, "Forwarded message to third api");
            }
            Err(e) => {
                metrics::counter!("dingrelay_fanout_total", "outcome" => "failure").increment(1);
                error!(sink = %self.url, error = %e, "Failed to send third api");
            }
        }
    }

    /// One POST on a fresh connection; only a 200 counts as delivered.
    #[instrument(skip_all, fields(target = %target.name))]
    pub async fn try_forward(
        &self,
        message: &WebhookMessage,
        target: &Target,
    ) -> Result<(), FanoutError> {
        let body = serde_json::to_vec(&self.payload(message, target)?)?;

        let client = outbound_client(self.timeout)?;
        let response = client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FanoutError::Status(status));
        }
        Ok(())
    }

    /// The inbound object as received, with the two sink keys set on top.
    fn payload(
        &self,
        message: &WebhookMessage,
        target: &Target,
    ) -> Result<Map<String, Value>, FanoutError> {
        let mut payload = if message.raw.is_empty() {
            match serde_json::to_value(message)? {
                Value::Object(map) => map,
                _ => Map::new(),
            }
        } else {
            message.raw.clone()
        };
        payload.insert("source".to_string(), Value::from(self.source.as_str()));
        payload.insert(
            "dingtalkWebhookUrl".to_string(),
            Value::from(target.url.as_str()),
        );
        Ok(payload)
    }
}
