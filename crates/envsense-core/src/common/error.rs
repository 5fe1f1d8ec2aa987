//! Error types for the envsense services.
//!
//! This module defines the central `Error` enum, which captures all recoverable
//! and reportable error cases of the RPC handlers and the streaming sessions
//! behind them. It implements `From<Error>` for `tonic::Status` so that a
//! handler can return an error with `?` and the caller receives an appropriate
//! status code.
//!
//! ## Error Cases
//! - `InvalidRequest`: The caller sent an out-of-range or malformed value.
//! - `Transport`: The underlying stream failed while a session was reading
//!   from it.
//! - `Internal`: An unexpected fault inside a producer or aggregator.
//! - `ServiceShutdown`: A session was opened or interrupted while the service
//!   was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the envsense services.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// The request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The inbound stream reported a failure.
    #[error("Transport error: {0}")]
    Transport(#[from] Status),

    /// Unexpected fault inside a session.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            // Surface the transport's own status so the caller sees the
            // original code.
            Error::Transport(status) => status,
            Error::Internal { context } => Status::internal(context),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
