//! Request-level failures of `POST /{name}/send` and how each one is
//! answered and logged.

use crate::models::PayloadError;
use crate::notification::{BuildError, DispatchError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

/// Every way a send request can fail. The first failing stage wins.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("target not found")]
    TargetNotFound,
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("failed to build notification: {0}")]
    Build(#[from] BuildError),
    #[error("failed to send notification: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("DingTalk returned error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl SendError {
    pub fn status(&self) -> StatusCode {
        match self {
            SendError::TargetNotFound => StatusCode::NOT_FOUND,
            // Transport and remote failures stay 400 so upstream sees a
            // uniform client error, as Alertmanager receivers expect.
            SendError::Payload(_)
            | SendError::Build(_)
            | SendError::Dispatch(_)
            | SendError::Remote { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Label for the `outcome` dimension of the notification counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            SendError::TargetNotFound => "target_not_found",
            SendError::Payload(_) => "bad_payload",
            SendError::Build(_) => "build_failed",
            SendError::Dispatch(_) => "dispatch_failed",
            SendError::Remote { .. } => "remote_error",
        }
    }

    /// Emits the log event for this failure in the caller's span.
    pub fn log(&self) {
        match self {
            SendError::TargetNotFound => warn!("Target not found"),
            SendError::Payload(e) => {
                error!(error = %e, "Cannot decode prometheus webhook JSON request")
            }
            SendError::Build(e) => error!(error = %e, "Failed to build notification"),
            SendError::Dispatch(e) => error!(error = %e, "Failed to send notification"),
            SendError::Remote { code, message } => error!(
                resp_code = code,
                resp_msg = %message,
                "Failed to send notification to DingTalk"
            ),
        }
    }

    fn body(&self) -> &'static str {
        match self {
            SendError::TargetNotFound => "404 page not found\n",
            SendError::Remote { .. } => "Unable to talk to DingTalk\n",
            _ => "Bad Request\n",
        }
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}
