//! Crate-level error types and the shared API error handler.

use std::io;

use crate::session::SessionStore;

/// Error returned by a REST call against the listing API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server rejected the session (HTTP 401 or 403).
    ///
    /// Carries the status code. The shared handler clears the local session
    /// and asks the caller to redirect to the login route.
    #[error("not authorized (HTTP {0})")]
    Unauthorized(u16),

    /// The server rejected the request payload (HTTP 400).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other non-success status code.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Connection, TLS or timeout failure before a status was received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON shape we expected.
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Returns `true` for 401/403 rejections.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Error returned by the push channel transport.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The configured push URL is not a `ws://` or `wss://` URL.
    #[error("invalid push channel URL: {0}")]
    InvalidUrl(String),

    /// A live connection was already started for this desk.
    #[error("push channel connection already started")]
    AlreadyStarted,

    /// The background connection task panicked.
    #[error("push channel task failed: {0}")]
    TaskFailed(String),
}

/// Error returned when reading or writing the local session file.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The session could not be serialized.
    #[error("session encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Error returned while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    Invalid {
        /// Name of the environment variable.
        var: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Error returned by the [`Desk`](crate::Desk) composition root.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// An operation needs the signed-in operator but the session is empty.
    #[error("no operator is signed in")]
    NotSignedIn,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What the caller should do after an API failure was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The session was cleared; navigate to the login route.
    RedirectToLogin,
    /// The error was logged and dropped. The operation is not retried.
    Dropped,
}

/// Shared handler every fetch failure is funneled through.
///
/// Authentication failures clear the persisted session and demand a
/// redirect to login. Validation failures are logged at `warn`; every other
/// kind is logged at `error`. Nothing is retried.
///
/// # Arguments
///
/// * `err` - The failure returned by a [`ListingApi`](crate::ListingApi) call.
/// * `session` - The session store to clear on 401/403.
///
/// # Returns
///
/// The [`ErrorDisposition`] the caller should act on.
pub fn handle_api_error(err: &ApiError, session: &SessionStore) -> ErrorDisposition {
    match err {
        ApiError::Unauthorized(status) => {
            tracing::warn!(status, "session rejected by server, signing out");
            if let Err(e) = session.clear() {
                tracing::error!(error = %e, "failed to clear local session");
            }
            ErrorDisposition::RedirectToLogin
        }
        ApiError::Validation(message) => {
            tracing::warn!(%message, "request rejected by server validation");
            ErrorDisposition::Dropped
        }
        other => {
            tracing::error!(error = %other, "API request failed");
            ErrorDisposition::Dropped
        }
    }
}
