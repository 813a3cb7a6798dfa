// Client-side error taxonomy
use std::collections::HashMap;
use std::io;

use thiserror::Error;

/// Errors surfaced by the portal core and its collaborator clients.
///
/// The variant decides the recovery policy: connectivity problems are
/// recovered locally (optimistic session, permissive permission checks),
/// auth rejections purge credentials and are not retried, validation stays
/// on the client, and everything else is logged and handled conservatively.
#[derive(Debug, Error, Clone)]
pub enum PortalError {
    /// Network unreachable, timeout, or connection reset.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// 401/403 from the backend or the identity provider.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Missing or malformed form fields. Never sent to the backend;
    /// surfaced inline per field.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        field_errors: HashMap<String, String>,
    },

    /// Anything not covered above.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl PortalError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        PortalError::Connectivity(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        PortalError::Auth(message.into())
    }

    pub fn validation(
        message: impl Into<String>,
        field_errors: HashMap<String, String>,
    ) -> Self {
        PortalError::Validation {
            message: message.into(),
            field_errors,
        }
    }

    /// Single-field validation error
    pub fn missing_field(field: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), "This field is required".to_string());
        PortalError::Validation {
            message: "Missing required fields".to_string(),
            field_errors,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        PortalError::Unknown(message.into())
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, PortalError::Connectivity(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, PortalError::Auth(_))
    }

    /// Stable code for logging and client handling
    pub fn code(&self) -> &'static str {
        match self {
            PortalError::Connectivity(_) => "CONNECTIVITY_ERROR",
            PortalError::Auth(_) => "AUTH_ERROR",
            PortalError::Validation { .. } => "VALIDATION_ERROR",
            PortalError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Classify a non-success HTTP response from the backend or provider.
    ///
    /// 401/403 purge credentials, 400/422 are validation responses whose
    /// body may carry a per-field error map, everything else is unknown.
    /// Transport-level failures never reach here; they are classified in
    /// the `reqwest::Error` conversion.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => PortalError::auth(format!("request rejected with status {}", status)),
            400 | 422 => {
                let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
                let message = parsed
                    .as_ref()
                    .and_then(|v| v.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("Request validation failed")
                    .to_string();
                let field_errors = parsed
                    .as_ref()
                    .and_then(|v| v.get("field_errors"))
                    .and_then(|f| f.as_object())
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| {
                                v.as_str().map(|s| (k.clone(), s.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                PortalError::Validation {
                    message,
                    field_errors,
                }
            }
            other => PortalError::unknown(format!("unexpected status {}: {}", other, body)),
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || is_transport_interruption(&err) {
            return PortalError::Connectivity(err.to_string());
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return PortalError::Auth(err.to_string());
            }
        }
        PortalError::Unknown(err.to_string())
    }
}

/// A peer that accepts the connection and then drops it mid-request surfaces
/// as a generic send error; the I/O kind buried in the source chain is what
/// identifies it as a connectivity failure.
fn is_transport_interruption(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cause = Some(err);
    while let Some(current) = cause {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        cause = current.source();
    }
    false
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Unknown(format!("malformed response payload: {}", err))
    }
}
