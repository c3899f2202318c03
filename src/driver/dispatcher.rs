use bytes::BytesMut;
use std::{fmt, io, sync::Arc, time::SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::path;
use super::types::{FileObject, LinkResource, RangeSpec, UploadRequest};
use crate::charset::Charset;
use crate::context::OpContext;
use crate::errors::{DriverError, Operation};
use crate::pool::{Lane, PooledSession, SessionError, SessionFactory, SessionProvider};
use crate::protocol::{EntryKind, FtpControl, RemoteError};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const COPY_CHUNK: usize = 64 * 1024;

// -----------------------------------------------------------------------------
// ----- OperationDispatcher ---------------------------------------------------

type FactoryOf<P> = <P as SessionProvider>::Factory;

/// Filesystem operations over pooled FTP sessions.
///
/// Each operation borrows from its lane, issues one remote command, and gives
/// the session back on every exit path. Sessions whose control channel broke
/// are evicted instead of returned.
pub struct OperationDispatcher<P: SessionProvider + ?Sized> {
    provider: Arc<P>,
    charset: Charset,
}

impl<P: SessionProvider + ?Sized> Clone for OperationDispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            charset: self.charset,
        }
    }
}

impl<P: SessionProvider + ?Sized> fmt::Debug for OperationDispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDispatcher")
            .field("charset", &self.charset)
            .field("pools", &self.provider.stats())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- OperationDispatcher: Static -------------------------------------------

impl<P: SessionProvider + ?Sized> OperationDispatcher<P> {
    pub fn new(provider: Arc<P>, charset: Charset) -> Self {
        Self { provider, charset }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}

// -----------------------------------------------------------------------------
// ----- OperationDispatcher: Public -------------------------------------------

impl<P> OperationDispatcher<P>
where
    P: SessionProvider + ?Sized,
    FactoryOf<P>: SessionFactory<Error = SessionError>,
    <FactoryOf<P> as SessionFactory>::Session: FtpControl,
{
    pub async fn list(&self, ctx: &OpContext, dir: &FileObject) -> Result<Vec<FileObject>, DriverError> {
        let mut lease = self.borrow(Lane::Control, ctx).await?;

        let remote = self.charset.encode(&dir.path);
        let res = lease.session_mut().list(&remote).await;
        let entries = self.settle(lease, Operation::List, &dir.path, res).await?;

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_pseudo())
            .map(|entry| {
                let name = self.charset.decode(&entry.name).into_owned();
                FileObject {
                    path: path::join(&dir.path, &name),
                    name,
                    size: entry.size,
                    modified: entry.modified,
                    created: entry.modified,
                    is_folder: entry.kind == EntryKind::Folder,
                }
            })
            .collect())
    }

    /// Content is only served through ranged reads.
    pub fn link(&self, _file: &FileObject) -> LinkResource {
        LinkResource::RangeReader
    }

    /// Copies at most `range.size` bytes starting at `range.offset` into
    /// `sink`. The sink is shut down exactly once, whatever the outcome.
    pub async fn range_read<W>(
        &self,
        ctx: &OpContext,
        file: &FileObject,
        range: RangeSpec,
        mut sink: W,
    ) -> Result<u64, DriverError>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let copied = self.range_read_into(ctx, file, range, &mut sink).await;
        let closed = sink.shutdown().await;

        match (copied, closed) {
            (Ok(n), Ok(())) => Ok(n),
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(DriverError::io(Operation::RangeRead, &file.path, err)),
        }
    }

    pub async fn make_dir(
        &self,
        ctx: &OpContext,
        parent: &FileObject,
        name: &str,
    ) -> Result<FileObject, DriverError> {
        let target = path::join(&parent.path, name);
        let mut lease = self.borrow(Lane::Control, ctx).await?;

        let res = lease.session_mut().make_dir(&self.charset.encode(&target)).await;
        self.settle(lease, Operation::MakeDir, &target, res).await?;

        let now = SystemTime::now();
        Ok(FileObject {
            name: name.to_string(),
            path: target,
            size: 0,
            modified: now,
            created: now,
            is_folder: true,
        })
    }

    pub async fn move_to(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        dst_dir: &FileObject,
    ) -> Result<FileObject, DriverError> {
        let target = path::join(&dst_dir.path, &src.name);
        self.rename_remote(ctx, Operation::Move, src, &target).await?;

        Ok(FileObject {
            path: target,
            ..src.clone()
        })
    }

    pub async fn rename(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        new_name: &str,
    ) -> Result<FileObject, DriverError> {
        let target = path::join(&src.parent_path(), new_name);
        self.rename_remote(ctx, Operation::Rename, src, &target).await?;

        Ok(FileObject {
            name: new_name.to_string(),
            path: target,
            ..src.clone()
        })
    }

    pub fn copy(&self, _src: &FileObject, _dst_dir: &FileObject) -> Result<FileObject, DriverError> {
        Err(DriverError::Unsupported(Operation::Copy))
    }

    pub async fn remove(&self, ctx: &OpContext, obj: &FileObject) -> Result<(), DriverError> {
        let mut lease = self.borrow(Lane::Control, ctx).await?;

        let remote = self.charset.encode(&obj.path);
        let res = if obj.is_folder {
            lease.session_mut().remove_dir_all(&remote).await
        } else {
            lease.session_mut().delete_file(&remote).await
        };
        self.settle(lease, Operation::Remove, &obj.path, res).await
    }

    pub async fn put(
        &self,
        ctx: &OpContext,
        dst_dir: &FileObject,
        upload: UploadRequest,
    ) -> Result<FileObject, DriverError> {
        let UploadRequest { object, mut body } = upload;
        let target = path::join(&dst_dir.path, &object.name);
        let mut lease = self.borrow(Lane::Control, ctx).await?;

        let res = lease
            .session_mut()
            .store(&self.charset.encode(&target), &mut *body)
            .await;
        let stored = self.settle(lease, Operation::Put, &target, res).await?;
        debug!("stored {stored} bytes at {target}");

        Ok(FileObject {
            name: object.name,
            path: target,
            size: object.size,
            modified: object.created,
            created: object.created,
            is_folder: false,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- OperationDispatcher: Private ------------------------------------------

impl<P> OperationDispatcher<P>
where
    P: SessionProvider + ?Sized,
    FactoryOf<P>: SessionFactory<Error = SessionError>,
    <FactoryOf<P> as SessionFactory>::Session: FtpControl,
{
    async fn borrow(&self, lane: Lane, ctx: &OpContext) -> Result<PooledSession<FactoryOf<P>>, DriverError> {
        Ok(self.provider.borrow(lane, ctx).await?)
    }

    /// Hands the session back (or evicts it) and attaches operation context.
    async fn settle<T>(
        &self,
        lease: PooledSession<FactoryOf<P>>,
        op: Operation,
        path: &str,
        res: Result<T, RemoteError>,
    ) -> Result<T, DriverError> {
        match res {
            Ok(value) => {
                lease.release().await;
                Ok(value)
            }
            Err(err) => {
                if err.is_transport() {
                    debug!("{op} {path}: evicting session after transport error");
                    lease.evict().await;
                } else {
                    lease.release().await;
                }
                Err(DriverError::protocol(op, path, err))
            }
        }
    }

    async fn rename_remote(
        &self,
        ctx: &OpContext,
        op: Operation,
        src: &FileObject,
        target: &str,
    ) -> Result<(), DriverError> {
        let mut lease = self.borrow(Lane::Control, ctx).await?;

        let from = self.charset.encode(&src.path);
        let to = self.charset.encode(target);
        let res = lease.session_mut().rename(&from, &to).await;
        self.settle(lease, op, &src.path, res).await
    }

    async fn range_read_into<W>(
        &self,
        ctx: &OpContext,
        file: &FileObject,
        range: RangeSpec,
        sink: &mut W,
    ) -> Result<u64, DriverError>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let op = Operation::RangeRead;
        let mut lease = self.borrow(Lane::Transfer, ctx).await?;

        let remote = self.charset.encode(&file.path);
        let res = lease.session_mut().retrieve_from(&remote, range.offset).await;
        let stream = match res {
            Ok(stream) => stream,
            Err(err) => return self.settle(lease, op, &file.path, Err(err)).await,
        };

        // the data stream is dropped with the copy future, closing the data
        // connection before the control reply is read
        let copied = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(CopyError::Cancelled),
            copied = copy_bounded(stream, sink, range.size) => copied,
        };

        match copied {
            Ok(n) => {
                let finished = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => None,
                    finished = lease.session_mut().finish_transfer() => Some(finished),
                };

                match finished {
                    Some(Ok(())) => {
                        lease.release().await;
                        Ok(n)
                    }
                    Some(Err(err)) => {
                        debug!("{op} {}: transfer did not complete cleanly: {err}", file.path);
                        lease.evict().await;
                        Err(DriverError::protocol(op, &file.path, err))
                    }
                    None => {
                        lease.evict().await;
                        Err(DriverError::Cancelled)
                    }
                }
            }
            // an interrupted transfer leaves the control channel mid-reply
            Err(err) => {
                lease.evict().await;
                Err(match err {
                    CopyError::Cancelled => DriverError::Cancelled,
                    CopyError::Source(e) => DriverError::protocol(op, &file.path, RemoteError::Io(e)),
                    CopyError::Sink(e) => DriverError::io(op, &file.path, e),
                })
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Bounded copy ------------------------------------------------

#[derive(Debug)]
enum CopyError {
    Cancelled,
    Source(io::Error),
    Sink(io::Error),
}

/// Never reads past `limit` bytes, even when the source has more.
async fn copy_bounded<R, W>(source: R, sink: &mut W, limit: u64) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut source = source.take(limit);
    let chunk = usize::try_from(limit).map_or(COPY_CHUNK, |l| l.clamp(1, COPY_CHUNK));
    let mut buf = BytesMut::with_capacity(chunk);
    let mut copied = 0u64;

    loop {
        buf.clear();
        let n = source.read_buf(&mut buf).await.map_err(CopyError::Source)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf).await.map_err(CopyError::Sink)?;
        copied += n as u64;
    }

    sink.flush().await.map_err(CopyError::Sink)?;
    Ok(copied)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
