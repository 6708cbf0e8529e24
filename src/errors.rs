//! Standardized error types following the `error-registrar-<domain>-<number>` format.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;
use std::error::Error as StdError;
use thiserror::Error;

use crate::registration::Operation;

/// Upper bound on the response body retained for diagnostics.
pub const MAX_ERROR_BODY_BYTES: usize = 4096;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-registrar-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when HTTP_PORT cannot be parsed
    #[error("error-registrar-config-2 Parsing HTTP_PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-registrar-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when a URL cannot be parsed
    #[error("error-registrar-config-4 Unable to parse URL '{0}': {1}")]
    UrlParsingFailed(String, url::ParseError),

    /// Error when duration string cannot be parsed
    #[error("error-registrar-config-5 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),
}

/// Non-success response from the identity provider.
///
/// Two values classify the same when status and operation match; the body is
/// diagnostic only and is truncated to [`MAX_ERROR_BODY_BYTES`].
#[derive(Debug, Clone, Error)]
#[error("error-registrar-http-1 {operation} failed: HTTP {}: {body}", .status.as_u16())]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub body: String,
    pub operation: Operation,
}

impl PartialEq for HttpStatusError {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.operation == other.operation
    }
}

impl Eq for HttpStatusError {}

impl HttpStatusError {
    pub fn new(operation: Operation, status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            operation,
        }
    }

    /// Consumes the response, keeping at most [`MAX_ERROR_BODY_BYTES`] of its body.
    pub async fn from_response(operation: Operation, response: reqwest::Response) -> Self {
        let status = response.status();
        Self {
            status,
            body: read_bounded_body(response).await,
            operation,
        }
    }
}

/// Reads at most [`MAX_ERROR_BODY_BYTES`] of a response body and releases the response.
///
/// A body read failure is not an error here; whatever was read is kept.
pub(crate) async fn read_bounded_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();

    while body.len() < MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = MAX_ERROR_BODY_BYTES - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = ?err, "error body read interrupted");
                break;
            }
        }
    }
    drop(response);

    String::from_utf8_lossy(&body).into_owned()
}

/// Request execution errors raised below the registration engine
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection or protocol failure reported by the HTTP client
    #[error("error-registrar-transport-1 Request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The caller cancelled the request
    #[error("error-registrar-transport-2 Request cancelled")]
    Cancelled,

    /// The request body is a stream and cannot be sent a second time
    #[error("error-registrar-transport-3 Request body cannot be replayed after credential refresh")]
    BodyNotReplayable,

    /// A refreshed token could not be placed in the Authorization header
    #[error("error-registrar-transport-4 Refreshed credential is not a valid header value: {0}")]
    InvalidCredential(#[source] http::header::InvalidHeaderValue),

    /// Reading a response body failed
    #[error("error-registrar-transport-5 Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Dynamic client registration errors
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Register was called without an initial access token source
    #[error("error-registrar-registration-1 No credential source configured for client registration")]
    NoCredentialSource,

    /// Read, update or delete was called with an empty registration client URI
    #[error("error-registrar-registration-2 Missing registration client URI for {0}")]
    MissingRegistrationUri(Operation),

    /// The endpoint or registration client URI is not a valid URL
    #[error("error-registrar-registration-3 Invalid {operation} URL '{url}': {source}")]
    InvalidEndpoint {
        operation: Operation,
        url: String,
        source: url::ParseError,
    },

    /// The bearer token cannot be placed in the Authorization header
    #[error("error-registrar-registration-4 Invalid bearer token for {0}")]
    InvalidToken(Operation),

    /// Obtaining the initial access token failed
    #[error("error-registrar-registration-5 Failed to obtain initial access token: {0}")]
    InitialAccessToken(#[source] AdminError),

    /// Client metadata could not be serialized
    #[error("error-registrar-registration-6 Failed to encode {operation} request: {source}")]
    Encode {
        operation: Operation,
        source: serde_json::Error,
    },

    /// A success response did not contain a valid client information document
    #[error("error-registrar-registration-7 Failed to decode {operation} response: {source}")]
    Decode {
        operation: Operation,
        source: serde_json::Error,
    },

    /// The request could not be executed
    #[error("error-registrar-registration-8 {operation} request failed: {source}")]
    Transport {
        operation: Operation,
        source: TransportError,
    },

    /// The identity provider answered with an unexpected status
    #[error(transparent)]
    Http(#[from] HttpStatusError),
}

/// Administrative API errors
#[derive(Debug, Error)]
pub enum AdminError {
    /// The configured base URL cannot carry path segments
    #[error("error-registrar-admin-1 Base URL '{0}' cannot be used for API paths")]
    InvalidBaseUrl(String),

    /// Connection or protocol failure reported by the HTTP client
    #[error("error-registrar-admin-2 {operation} request failed: {source}")]
    Request {
        operation: &'static str,
        source: reqwest::Error,
    },

    /// The administrative API answered with an unexpected status
    #[error("error-registrar-admin-3 {operation} failed: HTTP {}: {body}", .status.as_u16())]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    /// A response body could not be decoded
    #[error("error-registrar-admin-4 Failed to decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        source: reqwest::Error,
    },

    /// No client in the realm carries the requested client id
    #[error("error-registrar-admin-5 Client not found: {0}")]
    ClientNotFound(String),

    /// The caller cancelled the request
    #[error("error-registrar-admin-6 {0} request cancelled")]
    Cancelled(&'static str),
}

impl AdminError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Realm admission errors; each one rejects a create request
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("error-registrar-admission-1 realm name must not be empty")]
    EmptyRealmName,

    #[error("error-registrar-admission-2 realm '{0}' is reserved")]
    ReservedRealm(String),

    #[error("error-registrar-admission-3 realm '{0}' is deny-listed")]
    DeniedRealm(String),

    #[error("error-registrar-admission-4 realm '{0}' already exists")]
    RealmExists(String),

    /// The existence check failed; the request is rejected rather than approved
    #[error("error-registrar-admission-5 unable to verify realm '{realm}': {source}")]
    ExistenceCheckFailed { realm: String, source: AdminError },

    /// The admitted object is not a valid resource
    #[error("error-registrar-admission-6 invalid object: {0}")]
    InvalidObject(String),
}

/// Webhook endpoint errors; surfaced to the API server as HTTP errors, not denials
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("error-registrar-webhook-1 AdmissionReview has no request")]
    MissingRequest,
}

pub type Result<T> = std::result::Result<T, WebhookError>;

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "malformed admission review");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_request", "error_description": self.to_string()})),
        )
            .into_response()
    }
}

/// Finds the [`HttpStatusError`] inside `err`, following the source chain.
///
/// Works on bare errors, on [`RegistrationError::Http`], and on errors wrapped
/// with `anyhow` context (pass `err.as_ref()`).
pub fn http_status_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a HttpStatusError> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(http) = err.downcast_ref::<HttpStatusError>() {
            return Some(http);
        }
        if let Some(RegistrationError::Http(http)) = err.downcast_ref::<RegistrationError>() {
            return Some(http);
        }
        current = err.source();
    }
    None
}

pub fn is_http_error(err: &(dyn StdError + 'static)) -> bool {
    http_status_error(err).is_some()
}

pub fn is_unauthorized(err: &(dyn StdError + 'static)) -> bool {
    http_status_error(err).is_some_and(|http| http.status == StatusCode::UNAUTHORIZED)
}

pub fn is_not_found(err: &(dyn StdError + 'static)) -> bool {
    http_status_error(err).is_some_and(|http| http.status == StatusCode::NOT_FOUND)
}
