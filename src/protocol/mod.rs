//! The FTP protocol collaborator.
//!
//! The wire protocol itself lives outside this crate. These traits name the
//! primitives the pool and the operations compose: greeting, login, listing,
//! retrieval from an offset, store, directory and rename commands, plus the
//! NOOP/QUIT pair used for validation and teardown. Paths cross this boundary
//! as raw bytes, already transcoded to the server's charset.

use async_trait::async_trait;
use std::{io, time::SystemTime};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::net::BoxedStream;

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

/// Body of a RETR, positioned at the requested offset.
pub type DataStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
    Link,
}

#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: Vec<u8>,
    pub size: u64,
    pub modified: SystemTime,
    pub kind: EntryKind,
}

impl RemoteEntry {
    /// `.` and `..` as reported by some LIST implementations.
    pub fn is_pseudo(&self) -> bool {
        self.name == b"." || self.name == b".."
    }
}

// -----------------------------------------------------------------------------
// ----- Connector -------------------------------------------------------------

/// Runs the server greeting over a freshly dialed transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: FtpControl;

    async fn handshake(&self, stream: BoxedStream) -> Result<Self::Conn, RemoteError>;
}

// -----------------------------------------------------------------------------
// ----- FtpControl ------------------------------------------------------------

/// An FTP control connection. One remote command per call.
#[async_trait]
pub trait FtpControl: Send + 'static {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), RemoteError>;

    async fn list(&mut self, path: &[u8]) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Opens a RETR positioned at `offset`. The control channel stays busy
    /// until [`finish_transfer`](Self::finish_transfer) reads the closing reply.
    async fn retrieve_from(&mut self, path: &[u8], offset: u64) -> Result<DataStream, RemoteError>;

    /// Reads the reply that ends a RETR once its data stream is dropped.
    /// A 426 for a transfer closed early counts as finished.
    async fn finish_transfer(&mut self) -> Result<(), RemoteError>;

    async fn store(
        &mut self,
        path: &[u8],
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, RemoteError>;

    async fn make_dir(&mut self, path: &[u8]) -> Result<(), RemoteError>;

    async fn rename(&mut self, from: &[u8], to: &[u8]) -> Result<(), RemoteError>;

    async fn delete_file(&mut self, path: &[u8]) -> Result<(), RemoteError>;

    async fn remove_dir_all(&mut self, path: &[u8]) -> Result<(), RemoteError>;

    async fn noop(&mut self) -> Result<(), RemoteError>;

    async fn quit(&mut self) -> Result<(), RemoteError>;
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("server replied {code}: {message}")]
    Reply { code: u16, message: String },

    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl RemoteError {
    pub fn reply(code: u16, message: impl Into<String>) -> Self {
        Self::Reply {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Reply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The control channel itself is broken; the session must not be reused.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) | Self::Protocol(_) => true,
            // 421: service closing control connection
            Self::Reply { code, .. } => *code == 421,
        }
    }

    /// 530 not logged in, 332 need account.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.code(), Some(530) | Some(332))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
