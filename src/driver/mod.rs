//! Host plugin boundary: the lifecycle and operation contract a host drives,
//! and the FTP implementation of it.

pub mod dispatcher;
pub mod ftp;
pub mod path;
pub mod types;

pub use dispatcher::OperationDispatcher;
pub use ftp::{FtpDriver, ftp_driver_constructor};
pub use types::{
    BoxedBody, BoxedSink, DriverProps, FileObject, LinkResource, RangeSpec, UploadRequest,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{DriverConfig, FormField};
use crate::context::OpContext;
use crate::errors::DriverError;

// -----------------------------------------------------------------------------
// ----- Driver ----------------------------------------------------------------

#[async_trait]
pub trait Driver: Send + Sync {
    fn props(&self) -> DriverProps;

    fn form_meta(&self) -> Vec<FormField>;

    async fn init(&mut self, ctx: &OpContext, config: DriverConfig) -> Result<(), DriverError>;

    async fn teardown(&mut self, ctx: &OpContext) -> Result<(), DriverError>;

    fn root(&self) -> Result<FileObject, DriverError>;

    async fn list(&self, ctx: &OpContext, dir: &FileObject) -> Result<Vec<FileObject>, DriverError>;

    async fn link(&self, ctx: &OpContext, file: &FileObject) -> Result<LinkResource, DriverError>;

    async fn link_range(
        &self,
        ctx: &OpContext,
        file: &FileObject,
        range: RangeSpec,
        sink: BoxedSink,
    ) -> Result<u64, DriverError>;

    async fn make_dir(
        &self,
        ctx: &OpContext,
        parent: &FileObject,
        name: &str,
    ) -> Result<FileObject, DriverError>;

    async fn move_to(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        dst_dir: &FileObject,
    ) -> Result<FileObject, DriverError>;

    async fn rename(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        new_name: &str,
    ) -> Result<FileObject, DriverError>;

    async fn copy(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        dst_dir: &FileObject,
    ) -> Result<FileObject, DriverError>;

    async fn remove(&self, ctx: &OpContext, obj: &FileObject) -> Result<(), DriverError>;

    async fn put(
        &self,
        ctx: &OpContext,
        dst_dir: &FileObject,
        upload: UploadRequest,
    ) -> Result<FileObject, DriverError>;
}

/// What a host registers to obtain fresh driver instances.
pub type DriverConstructor = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;
