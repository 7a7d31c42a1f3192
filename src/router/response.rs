//! JSON envelope wrapping every API response.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NotFound,
    Error,
    Unauth,
    Invalid,
}

impl Status {
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Error => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauth => StatusCode::UNAUTHORIZED,
            Self::Invalid => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Invalid => Self::Invalid,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Unauthorized => Self::Unauth,
            ErrorKind::Internal => Self::Error,
        }
    }
}

/// Error details. Only administrators get `message` and `stack`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub stack: Option<String>,
    pub friendly: Option<String>,
}

/// What a handler produced.
#[derive(Debug)]
pub enum Reply {
    /// Wrapped as the envelope `Message`.
    Json(serde_json::Value),
    /// Empty `Message`.
    Empty,
    /// Sent as is, outside of the envelope.
    Text(String),
}

impl Reply {
    /// Serialize `data` as the envelope `Message`.
    pub fn json(data: impl Serialize) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(data)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    pub status: Status,
    pub message: serde_json::Value,
    pub error: Option<ErrorDetail>,
}

impl Envelope {
    pub fn ok(message: serde_json::Value) -> Self {
        Self {
            status: Status::Ok,
            message,
            error: None,
        }
    }

    /// Render `err` for a caller, admin or not.
    pub fn error(err: &ServerError, admin: bool) -> Self {
        let status = Status::from(err.kind());
        if status == Status::Error {
            tracing::error!(error = %err, "request failed");
        }

        let error = if admin {
            ErrorDetail {
                message: Some(err.to_string()),
                stack: Some(err.stack()),
                friendly: Some(err.friendly()),
            }
        } else {
            ErrorDetail {
                friendly: Some(err.friendly()),
                ..Default::default()
            }
        };

        Self {
            status,
            message: serde_json::Value::Null,
            error: Some(error),
        }
    }

    pub fn not_found() -> Self {
        Self::error(&ServerError::NotFound, false)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status.code(), Json(self)).into_response()
    }
}

/// Turn a handler result into an HTTP response.
pub fn respond(result: Result<Reply>, admin: bool) -> Response {
    match result {
        Ok(Reply::Json(message)) => Envelope::ok(message).into_response(),
        Ok(Reply::Empty) => Envelope::ok(serde_json::Value::Null).into_response(),
        Ok(Reply::Text(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => Envelope::error(&err, admin).into_response(),
    }
}
