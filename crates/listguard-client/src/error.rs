//! HTTP collaborator error types.

use listguard_core::CallError;

/// Longest response body excerpt kept in an error.
const BODY_EXCERPT: usize = 512;

/// Errors from calls against the API under test.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The API returned a non-2xx status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {reason}")]
    Deserialization { endpoint: String, reason: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl ClientError {
    pub(crate) fn status(endpoint: &str, status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(BODY_EXCERPT) {
            Some((cut, _)) => format!("{}...", &body[..cut]),
            None => body.to_string(),
        };
        Self::Status {
            endpoint: endpoint.to_string(),
            status,
            body,
        }
    }
}

impl From<ClientError> for CallError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http { endpoint, source } => CallError::Transport {
                endpoint,
                reason: source.to_string(),
            },
            ClientError::Status {
                endpoint,
                status: status @ (401 | 403),
                ..
            } => CallError::AccessDenied { endpoint, status },
            ClientError::Status {
                endpoint,
                status: 404,
                ..
            } => CallError::NotFound { endpoint },
            ClientError::Status {
                endpoint,
                status: 400 | 422,
                body,
            } => CallError::ValidationFailed { endpoint, body },
            ClientError::Status {
                endpoint,
                status,
                body,
            } => CallError::Api {
                endpoint,
                status,
                body,
            },
            ClientError::Deserialization { endpoint, reason } => {
                CallError::Decode { endpoint, reason }
            }
            ClientError::Config(e) => CallError::Transport {
                endpoint: "client configuration".into(),
                reason: e.to_string(),
            },
        }
    }
}
