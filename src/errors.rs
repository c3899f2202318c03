use std::{fmt, io};
use thiserror::Error;

use crate::config::{AddressError, ConfigError};
use crate::pool::{PoolError, SessionError};
use crate::protocol::RemoteError;

// -----------------------------------------------------------------------------
// ----- Operation -------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Link,
    RangeRead,
    MakeDir,
    Move,
    Rename,
    Copy,
    Remove,
    Put,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Link => "link",
            Operation::RangeRead => "range read",
            Operation::MakeDir => "make dir",
            Operation::Move => "move",
            Operation::Rename => "rename",
            Operation::Copy => "copy",
            Operation::Remove => "remove",
            Operation::Put => "put",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// ----- DriverError -----------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot reach ftp server: {0}")]
    Connect(#[source] SessionError),

    #[error("ftp login failed: {0}")]
    Auth(#[source] SessionError),

    #[error("no ftp session available: {0}")]
    Pool(#[source] PoolError<SessionError>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{op} {path:?} failed: {source}")]
    Protocol {
        op: Operation,
        path: String,
        source: RemoteError,
    },

    #[error("{op} {path:?} failed while streaming: {source}")]
    Io {
        op: Operation,
        path: String,
        source: io::Error,
    },

    #[error("{0} is not supported by the ftp driver")]
    Unsupported(Operation),

    #[error("driver is not initialized")]
    NotInitialized,
}

// -----------------------------------------------------------------------------
// ----- DriverError: Conversions ----------------------------------------------

impl From<AddressError> for DriverError {
    fn from(err: AddressError) -> Self {
        DriverError::Config(err.into())
    }
}

impl From<SessionError> for DriverError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Auth { .. } => DriverError::Auth(err),
            SessionError::Cancelled => DriverError::Cancelled,
            _ => DriverError::Connect(err),
        }
    }
}

impl From<PoolError<SessionError>> for DriverError {
    fn from(err: PoolError<SessionError>) -> Self {
        match err {
            PoolError::Create { source, .. } => source.into(),
            PoolError::Cancelled { .. } => DriverError::Cancelled,
            _ => DriverError::Pool(err),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- DriverError: Public ---------------------------------------------------

impl DriverError {
    pub fn protocol(op: Operation, path: &str, source: RemoteError) -> Self {
        DriverError::Protocol {
            op,
            path: path.to_string(),
            source,
        }
    }

    pub fn io(op: Operation, path: &str, source: io::Error) -> Self {
        DriverError::Io {
            op,
            path: path.to_string(),
            source,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, DriverError::Config(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, DriverError::Auth(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, DriverError::Unsupported(_))
    }

    /// Remote reply code, when the server answered with an error.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            DriverError::Protocol { source, .. } => source.code(),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
