//! Unified error type.

use std::time::Duration;

/// The error type returned by podlab's fallible operations.
///
/// Probe failures (500 on `/healthz`, 503 on `/ready`) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// bad caller input, rejected control requests, and infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),

    /// A size parameter that is not a positive integer. Nothing was mutated.
    #[error("invalid mb parameter {0:?}, must be > 0")]
    InvalidArgument(String),

    /// A continuous allocation loop is already active. Informational: the
    /// running loop is untouched.
    #[error("continuous allocation already running")]
    AlreadyRunning,

    /// In-flight connections outlived the drain budget. Reported, not fatal.
    #[error("drain did not complete within {0:?}")]
    DrainTimeout(Duration),
}
