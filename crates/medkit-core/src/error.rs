use crate::{SessionId, Table};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid {what} {value:?}: {reason}")]
    InvalidArgument {
        what: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Connection pool is full ({max} connections already open)")]
    ResourceExhausted { max: usize },

    #[error("Failed connecting {session_id:?} to the store: {cause}")]
    ConnectionFailed {
        session_id: SessionId,
        cause: ConnectionFailure,
    },

    #[error("Operation {operation:?} is already in progress in {holder:?}")]
    LockHeld {
        operation: String,
        holder: SessionId,
    },

    #[error("Backup file failed validation: {0}")]
    ImportValidationFailed(String),

    #[error("{table} record {key:?} does not exist in store")]
    RecordDoesNotExist { table: Table, key: String },

    #[error("{table} record {key:?} already exists in store")]
    RecordAlreadyExists { table: Table, key: String },

    #[error("Invalid location hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error(transparent)]
    Other(anyhow::Error),
}

impl Error {
    /// Whether retrying the same call later can succeed.
    ///
    /// Contention and connection problems are transient and should be presented as "try again",
    /// while everything else is either a caller bug or bad data.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ResourceExhausted { .. }
                | Error::ConnectionFailed { .. }
                | Error::LockHeld { .. }
        )
    }
}

/// Why a connection could not be handed out.
///
/// Cloneable so that a single failed opening can be reported to every caller that was awaiting
/// it.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConnectionFailure {
    #[error("opening the store timed out after {0:?}")]
    Timeout(Duration),

    #[error("opening the store failed: {0}")]
    Open(String),

    #[error("bootstrapping default data failed: {0}")]
    Bootstrap(String),

    #[error("connection was released while it was being opened")]
    Released,
}

pub trait ResultExt: Sized {
    type Ok;

    fn wrap_with_context(self, f: impl FnOnce() -> String) -> Result<Self::Ok>;

    fn wrap_context(self, s: &str) -> Result<Self::Ok> {
        self.wrap_with_context(|| s.to_string())
    }
}

impl<T> ResultExt for Result<T> {
    type Ok = T;

    fn wrap_with_context(self, f: impl FnOnce() -> String) -> Result<T> {
        match self {
            Err(Error::Other(e)) => Err(Error::Other(e.context(f()))),
            r => r,
        }
    }
}

impl<T> ResultExt for anyhow::Result<T> {
    type Ok = T;

    fn wrap_with_context(self, f: impl FnOnce() -> String) -> Result<T> {
        match self {
            Err(e) => Err(Error::Other(e.context(f()))),
            Ok(r) => Ok(r),
        }
    }
}

impl<T> ResultExt for serde_json::Result<T> {
    type Ok = T;

    fn wrap_with_context(self, f: impl FnOnce() -> String) -> Result<T> {
        match self {
            Err(e) => Err(Error::Other(anyhow::Error::from(e).context(f()))),
            Ok(r) => Ok(r),
        }
    }
}
