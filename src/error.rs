//! Error taxonomy for calls against the CloudMailing master API.
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("not authorized")]
    NotAuthorized,
    #[error("session timed out (HTTP {status})")]
    SessionTimeout { status: u16 },
    #[error("server error {status}: {detail}")]
    Business { status: u16, detail: String },
    #[error("invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("method {method} is not declared for resource '{resource}'")]
    MethodNotAllowed {
        resource: String,
        method: reqwest::Method,
    },
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
    #[error("invalid credential token: {0}")]
    Credentials(#[from] base64::DecodeError),
    #[error("credential store I/O error: {0}")]
    Store(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct DetailBody {
    detail: Option<String>,
}

impl ApiError {
    /// Map a non-success status and its body into the taxonomy.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::NotAuthenticated,
            403 => ApiError::NotAuthorized,
            419 | 440 => ApiError::SessionTimeout {
                status: status.as_u16(),
            },
            code => {
                let detail = serde_json::from_str::<DetailBody>(body)
                    .ok()
                    .and_then(|b| b.detail)
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| {
                        status
                            .canonical_reason()
                            .map(str::to_string)
                            .unwrap_or_else(|| body.to_string())
                    });
                ApiError::Business {
                    status: code,
                    detail,
                }
            }
        }
    }

    /// Authentication-class errors are handled by the session guard, not by views.
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            ApiError::NotAuthenticated | ApiError::NotAuthorized | ApiError::SessionTimeout { .. }
        )
    }

    /// Server-provided message, when there is one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Business { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotAuthenticated => Some(401),
            ApiError::NotAuthorized => Some(403),
            ApiError::SessionTimeout { status } => Some(*status),
            ApiError::Business { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
