//! Crate-wide error type.
//!
//! Follows the same shape as a typical sync database-client crate: one
//! `thiserror`-derived enum covering transport, protocol and server-reported
//! failures, plus an `eyre`-backed variant for internal invariant violations.

use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

/// The server's structural error code + message, carried verbatim.
///
/// Produced from a FAILURE message's metadata map. Stable and meant to be
/// matched on by callers (e.g. `error_code.starts_with("Neo.ClientError.")`).
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ServerFailure {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The underlying transport failed (connect, short read/write, reset).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Handshake negotiation failed: server offered no mutually supported version.
    #[error("protocol negotiation failed")]
    NegotiationFailed,

    /// A malformed value, chunk length, struct signature, or message type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server returned FAILURE for RUN or PULL_ALL.
    #[error("server evaluation failure: {0}")]
    ServerFailure(#[from] ServerFailure),

    /// IGNORED was received because a prior request in this session failed
    /// and ACK_FAILURE had not yet been acknowledged.
    #[error("statement ignored due to a previous failure in this session")]
    PreviousFailure,

    /// The session was reset while this stream had outstanding work.
    #[error("session was reset")]
    SessionReset,

    /// The session ended while this stream was still active.
    #[error("session has ended")]
    SessionEnded,

    /// Caller-side misuse: bad argument, wrong-typed parameter, out-of-range index.
    #[error("invalid usage: {0}")]
    Misuse(String),

    /// An invariant internal to the engine was violated; this is always a bug.
    #[error("internal bug: {0}")]
    Bug(color_eyre::Report),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::Bug(eyre!(format!("{:#?}", err)))
    }

    /// Whether this error means the underlying connection can no longer be trusted.
    pub fn is_conn_broken(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::NegotiationFailed | Self::Protocol(_) | Self::Bug(_)
        )
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}
