use std::{fmt, time::SystemTime};
use tokio::io::{AsyncRead, AsyncWrite};

use super::path;

// -----------------------------------------------------------------------------
// ----- FileObject ------------------------------------------------------------

/// A remote entry as the host sees it. Always returned by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileObject {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: SystemTime,
    pub created: SystemTime,
    pub is_folder: bool,
}

impl Default for FileObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
            created: SystemTime::UNIX_EPOCH,
            is_folder: false,
        }
    }
}

impl FileObject {
    pub fn file(file_path: impl Into<String>, size: u64) -> Self {
        let file_path = path::clean(&file_path.into());
        Self {
            name: path::base_name(&file_path).to_string(),
            path: file_path,
            size,
            ..Default::default()
        }
    }

    pub fn folder(folder_path: impl Into<String>) -> Self {
        let folder_path = path::clean(&folder_path.into());
        Self {
            name: path::base_name(&folder_path).to_string(),
            path: folder_path,
            is_folder: true,
            ..Default::default()
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_created(mut self, created: SystemTime) -> Self {
        self.created = created;
        self
    }

    pub fn parent_path(&self) -> String {
        path::parent(&self.path)
    }
}

// -----------------------------------------------------------------------------
// ----- Ranges and links ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub offset: u64,
    pub size: u64,
}

impl RangeSpec {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

/// How the host should fetch file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkResource {
    /// Content is only reachable through `link_range`.
    RangeReader,
}

// -----------------------------------------------------------------------------
// ----- Streams ---------------------------------------------------------------

pub type BoxedSink = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedBody = Box<dyn AsyncRead + Send + Unpin>;

/// An upload: the object's metadata plus its content stream.
pub struct UploadRequest {
    pub object: FileObject,
    pub body: BoxedBody,
}

impl UploadRequest {
    pub fn new(object: FileObject, body: BoxedBody) -> Self {
        Self { object, body }
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- DriverProps -----------------------------------------------------------

/// Capabilities advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverProps {
    pub name: &'static str,
    /// Content is always proxied; there are no direct download links.
    pub only_proxy: bool,
    pub no_cache: bool,
    pub read_mostly: bool,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
