#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    io::{self, Cursor},
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::{Duration, SystemTime},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use ftpool::net::{BoxedStream, Dialer};
use ftpool::protocol::{Connector, DataStream, EntryKind, FtpControl, RemoteEntry, RemoteError};
use ftpool::{DriverConfig, FtpDriver};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const USER: &str = "alice";
pub const PASSWORD: &str = "secret";
pub const ADDRESS: &str = "ftp://127.0.0.1";

pub fn mtime() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

// -----------------------------------------------------------------------------
// ----- MemoryServer ----------------------------------------------------------

/// An FTP server held in memory. Paths are raw bytes so non-UTF-8 names
/// survive untouched.
#[derive(Default)]
pub struct MemoryServer {
    files: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    dirs: Mutex<BTreeSet<Vec<u8>>>,
    generation: AtomicU64,

    pub offline: AtomicBool,
    pub fail_reads: AtomicBool,
    pub stall_reads: AtomicBool,
    pub dial_delay: Mutex<Option<Duration>>,
    pub login_reply: Mutex<Option<u16>>,

    pub dials: AtomicUsize,
    pub handshakes: AtomicUsize,
    pub logins: AtomicUsize,
    pub noops: AtomicUsize,
    pub quits: AtomicUsize,
    pub finishes: AtomicUsize,
    pub dialed: Mutex<Vec<String>>,
}

impl MemoryServer {
    pub fn new() -> Arc<Self> {
        let server = Self::default();
        server.dirs.lock().insert(b"/".to_vec());
        Arc::new(server)
    }

    pub fn add_file(&self, path: impl AsRef<[u8]>, data: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.as_ref().to_vec(), data.into());
    }

    pub fn add_dir(&self, path: impl AsRef<[u8]>) {
        self.dirs.lock().insert(path.as_ref().to_vec());
    }

    pub fn file(&self, path: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        self.files.lock().get(path.as_ref()).cloned()
    }

    pub fn has_dir(&self, path: impl AsRef<[u8]>) -> bool {
        self.dirs.lock().contains(path.as_ref())
    }

    /// Breaks every control connection opened so far.
    pub fn kill_sessions(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn children(&self, dir: &[u8]) -> Vec<RemoteEntry> {
        let prefix = child_prefix(dir);
        let direct = |key: &[u8]| -> Option<Vec<u8>> {
            let rest = key.strip_prefix(prefix.as_slice())?;
            (!rest.is_empty() && !rest.contains(&b'/')).then(|| rest.to_vec())
        };

        let mut entries = vec![pseudo(b"."), pseudo(b"..")];
        for key in self.dirs.lock().iter() {
            if let Some(name) = direct(key) {
                entries.push(entry(name, 0, EntryKind::Folder));
            }
        }
        for (key, data) in self.files.lock().iter() {
            if let Some(name) = direct(key) {
                entries.push(entry(name, data.len() as u64, EntryKind::File));
            }
        }
        entries
    }
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

fn child_prefix(dir: &[u8]) -> Vec<u8> {
    let mut prefix = dir.to_vec();
    if !prefix.ends_with(b"/") {
        prefix.push(b'/');
    }
    prefix
}

fn entry(name: Vec<u8>, size: u64, kind: EntryKind) -> RemoteEntry {
    RemoteEntry {
        name,
        size,
        modified: mtime(),
        kind,
    }
}

fn pseudo(name: &[u8]) -> RemoteEntry {
    entry(name.to_vec(), 0, EntryKind::Folder)
}

fn not_found() -> RemoteError {
    RemoteError::reply(550, "file unavailable")
}

// -----------------------------------------------------------------------------
// ----- Dialer + Connector ----------------------------------------------------

pub struct MemoryDialer {
    server: Arc<MemoryServer>,
}

impl MemoryDialer {
    pub fn new(server: Arc<MemoryServer>) -> Arc<Self> {
        Arc::new(Self { server })
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, address: &str) -> io::Result<BoxedStream> {
        self.server.dials.fetch_add(1, Ordering::SeqCst);
        self.server.dialed.lock().push(address.to_string());

        let delay = *self.server.dial_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.server.offline.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }
        let (client, _server) = tokio::io::duplex(64);
        Ok(Box::new(client))
    }
}

pub struct MemoryConnector {
    server: Arc<MemoryServer>,
}

impl MemoryConnector {
    pub fn new(server: Arc<MemoryServer>) -> Arc<Self> {
        Arc::new(Self { server })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Conn = MemoryConn;

    async fn handshake(&self, _stream: BoxedStream) -> Result<MemoryConn, RemoteError> {
        self.server.handshakes.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConn {
            server: self.server.clone(),
            generation: self.server.generation.load(Ordering::SeqCst),
            logged_in: false,
            pending_transfer: false,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- MemoryConn ------------------------------------------------------------

pub struct MemoryConn {
    server: Arc<MemoryServer>,
    generation: u64,
    logged_in: bool,
    pending_transfer: bool,
}

impl fmt::Debug for MemoryConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConn")
            .field("generation", &self.generation)
            .field("logged_in", &self.logged_in)
            .field("pending_transfer", &self.pending_transfer)
            .finish()
    }
}

impl MemoryConn {
    fn ready(&self) -> Result<&MemoryServer, RemoteError> {
        if self.server.generation.load(Ordering::SeqCst) != self.generation {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "control connection reset").into());
        }
        if !self.logged_in {
            return Err(RemoteError::reply(530, "not logged in"));
        }
        // a transfer reply nobody read is still queued ahead of this one
        if self.pending_transfer {
            return Err(RemoteError::Protocol("unexpected transfer reply".into()));
        }
        Ok(&self.server)
    }
}

#[async_trait]
impl FtpControl for MemoryConn {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), RemoteError> {
        self.server.logins.fetch_add(1, Ordering::SeqCst);
        let forced = *self.server.login_reply.lock();
        if let Some(code) = forced {
            return Err(RemoteError::reply(code, "login refused"));
        }
        if username != USER || password != PASSWORD {
            return Err(RemoteError::reply(530, "login incorrect"));
        }
        self.logged_in = true;
        Ok(())
    }

    async fn list(&mut self, path: &[u8]) -> Result<Vec<RemoteEntry>, RemoteError> {
        let server = self.ready()?;
        if !server.has_dir(path) {
            return Err(not_found());
        }
        Ok(server.children(path))
    }

    async fn retrieve_from(&mut self, path: &[u8], offset: u64) -> Result<DataStream, RemoteError> {
        let server = self.ready()?;
        let data = server.file(path).ok_or_else(not_found)?;
        let stream: DataStream = if server.fail_reads.load(Ordering::SeqCst) {
            Box::new(BrokenReader)
        } else if server.stall_reads.load(Ordering::SeqCst) {
            Box::new(StalledReader)
        } else {
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
            Box::new(Cursor::new(data[start..].to_vec()))
        };

        self.pending_transfer = true;
        Ok(stream)
    }

    async fn finish_transfer(&mut self) -> Result<(), RemoteError> {
        if !self.pending_transfer {
            return Err(RemoteError::Protocol("no transfer in progress".into()));
        }
        self.pending_transfer = false;
        self.server.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn store(
        &mut self,
        path: &[u8],
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, RemoteError> {
        self.ready()?;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let len = data.len() as u64;
        self.server.add_file(path, data);
        Ok(len)
    }

    async fn make_dir(&mut self, path: &[u8]) -> Result<(), RemoteError> {
        let server = self.ready()?;
        if !server.dirs.lock().insert(path.to_vec()) {
            return Err(RemoteError::reply(550, "directory exists"));
        }
        Ok(())
    }

    async fn rename(&mut self, from: &[u8], to: &[u8]) -> Result<(), RemoteError> {
        let server = self.ready()?;

        let file = server.files.lock().remove(from);
        if let Some(data) = file {
            server.add_file(to, data);
            return Ok(());
        }

        let mut dirs = server.dirs.lock();
        if !dirs.remove(from) {
            return Err(not_found());
        }
        dirs.insert(to.to_vec());
        drop(dirs);

        let prefix = child_prefix(from);
        let moved: Vec<Vec<u8>> = server
            .files
            .lock()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            let data = server.files.lock().remove(&key).unwrap_or_default();
            let mut target = child_prefix(to);
            target.extend_from_slice(&key[prefix.len()..]);
            server.add_file(target, data);
        }
        Ok(())
    }

    async fn delete_file(&mut self, path: &[u8]) -> Result<(), RemoteError> {
        let server = self.ready()?;
        server.files.lock().remove(path).map(|_| ()).ok_or_else(not_found)
    }

    async fn remove_dir_all(&mut self, path: &[u8]) -> Result<(), RemoteError> {
        let server = self.ready()?;
        if !server.dirs.lock().remove(path) {
            return Err(not_found());
        }
        let prefix = child_prefix(path);
        server.dirs.lock().retain(|k| !k.starts_with(&prefix));
        server.files.lock().retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn noop(&mut self) -> Result<(), RemoteError> {
        self.server.noops.fetch_add(1, Ordering::SeqCst);
        self.ready()?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), RemoteError> {
        self.server.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "data connection reset")))
    }
}

/// Never yields a byte; the transfer hangs until someone gives up on it.
struct StalledReader;

impl AsyncRead for StalledReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

// -----------------------------------------------------------------------------
// ----- RecordingSink ---------------------------------------------------------

/// A sink that remembers what it received and how often it was closed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub data: Arc<Mutex<Vec<u8>>>,
    pub shutdowns: Arc<AtomicUsize>,
    pub fail_writes: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail_writes.store(true, Ordering::SeqCst);
        sink
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl AsyncWrite for RecordingSink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")));
        }
        self.data.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

pub type MemoryDriver = FtpDriver<MemoryConnector, MemoryDialer>;

pub fn driver(server: &Arc<MemoryServer>) -> MemoryDriver {
    FtpDriver::new(MemoryConnector::new(server.clone()), MemoryDialer::new(server.clone()))
}

/// Small pools so session counts stay predictable: one warm session per lane.
pub fn config() -> DriverConfig {
    DriverConfig::new(ADDRESS, USER, PASSWORD).with_pool_sizes(2, 2)
}

/// 256 bytes counting up from zero, repeated.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..=255u8).cycle().take(len).collect()
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
