use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The caller sent something we cannot act on. Raised before any I/O.
    #[error("{0}")]
    BadRequest(String),

    /// Demucs exited non-zero, could not be started or left no output behind.
    #[error("{0}")]
    ToolFailure(String),

    #[error("Demucs did not finish within {}s", .0.as_secs())]
    ToolTimeout(Duration),

    /// Download or upload against object storage failed.
    #[error("{0}")]
    TransferFailure(String),

    #[error("{0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl RunnerError {
    pub fn status(&self) -> StatusCode {
        match self {
            RunnerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RunnerError::ToolFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RunnerError::ToolTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RunnerError::TransferFailure(_) => StatusCode::BAD_GATEWAY,
            RunnerError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RunnerError::BadRequest(_) => "bad_request",
            RunnerError::ToolFailure(_) => "tool_failure",
            RunnerError::ToolTimeout(_) => "tool_timeout",
            RunnerError::TransferFailure(_) => "transfer_failure",
            RunnerError::Unexpected(_) => "internal_error",
        }
    }

    pub(crate) fn transfer(err: anyhow::Error) -> Self {
        RunnerError::TransferFailure(format!("{err:#}"))
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Unexpected(err.into())
    }
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<&RunnerError> for HttpErrorResponse {
    fn from(err: &RunnerError) -> Self {
        HttpErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            warn!(code = self.code(), "Rejected request: {}", self);
        } else {
            error!(code = self.code(), "Request failed: {}", self);
        }

        let mut res = Json(HttpErrorResponse::from(&self)).into_response();
        *res.status_mut() = status;
        res
    }
}

pub type RunnerResult<T, E = RunnerError> = Result<T, E>;

#[macro_export]
macro_rules! bail_request {
    ($error_message:expr) => {
        return Err($crate::error::RunnerError::BadRequest(String::from($error_message)))
    };
    ($fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::RunnerError::BadRequest(format!($fmt $(, $arg)*)))
    };
}
