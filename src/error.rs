//! Error types for the driver.
//!
//! Backend outcomes that the driver understands are status values, not
//! faults: a diagnostic that is not ready yet is `None`, never an error.
//! Everything here is something a user action can run into.

use thiserror::Error;

use crate::session::RunState;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Invalid edit or missing/invalid file selection. No state was changed.
    #[error("{0}")]
    UserInput(String),

    /// The codec refused the buffer. Backend state was not touched.
    #[error("{0}")]
    ImportRejected(String),

    #[error("session is {0:?}, expected Idle")]
    NotIdle(RunState),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Fault raised by the opaque backend, propagated unchanged.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;
