use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

/// A failed request against the hosted backend.
///
/// Carries the backend's message text and, for HTTP failures, the status code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    status: Option<u16>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The backend rejected the credentials (expired or missing session)
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => BackendError::with_status(status.as_u16(), e.to_string()),
            None => BackendError::new(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::new(format!("Failed to decode response: {}", e))
    }
}

/// Pull the human-readable message out of an error body.
///
/// The REST layer answers `{"message": ...}`, the auth layer uses `msg`,
/// `error_description` or `error`; anything else is returned verbatim.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.trim().to_string()
}

pub(crate) async fn error_from_response(response: reqwest::Response, context: &str) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = extract_error_message(&body);
    let message = if detail.is_empty() {
        format!("{}: {}", context, status)
    } else {
        format!("{}: {} - {}", context, status, detail)
    };
    BackendError::with_status(status.as_u16(), message)
}
