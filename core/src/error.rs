//! Error types for the OpenStreetCam client.
//!
//! # Design
//! Each layer has its own error: the transport reports `TransportError`, the
//! parser reports `MalformedResponseError`. `Service` operations fold both
//! into `ServiceError` together with API-reported failures, so callers handle
//! a single type while `source()` still reaches the original cause.

use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be made or broke off mid-exchange.
    #[error("request to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The response body is not valid UTF-8.
    #[error("response from {url} is not valid UTF-8")]
    Decode { url: String },

    /// A raw download answered with a non-2xx status.
    #[error("download from {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// The response body does not match the expected envelope shape.
#[derive(Debug, Error)]
#[error("malformed response: {0}")]
pub struct MalformedResponseError(#[from] pub serde_json::Error);

/// Errors returned by `Service` operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponseError),

    /// The API answered but reported an error status.
    #[error("{message}")]
    Api { code: u16, message: String },

    /// One page of a multi-page query failed, so the whole query did.
    #[error("fetching page {page} failed: {source}")]
    PageFetch {
        page: u32,
        #[source]
        source: Box<ServiceError>,
    },

    /// A page worker panicked before producing a result.
    #[error("worker for page {page} panicked")]
    WorkerPanicked { page: u32 },

    /// No worker thread could be started for the remaining pages.
    #[error("could not start a page worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ServiceError {
    /// The API-supplied message, when the failure came from an error status.
    pub fn api_message(&self) -> Option<&str> {
        match self {
            ServiceError::Api { message, .. } => Some(message),
            ServiceError::PageFetch { source, .. } => source.api_message(),
            _ => None,
        }
    }
}

/// Configuration could not be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn api_error_displays_api_message() {
        let err = ServiceError::Api {
            code: 401,
            message: "Unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(err.api_message(), Some("Unauthorized"));
    }

    #[test]
    fn page_fetch_keeps_cause() {
        let err = ServiceError::PageFetch {
            page: 3,
            source: Box::new(ServiceError::Api {
                code: 500,
                message: "boom".to_string(),
            }),
        };
        assert_eq!(err.to_string(), "fetching page 3 failed: boom");
        assert_eq!(err.api_message(), Some("boom"));
        assert!(err.source().is_some());
    }

    #[test]
    fn transport_error_converts() {
        let err: ServiceError = TransportError::Decode {
            url: "http://x".to_string(),
        }
        .into();
        assert!(matches!(err, ServiceError::Transport(TransportError::Decode { .. })));
        assert!(err.api_message().is_none());
    }
}
