use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

// -----------------------------------------------------------------------------
// ----- Streams ---------------------------------------------------------------

/// Anything a session can run its control channel over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn AsyncStream>;

// -----------------------------------------------------------------------------
// ----- Dialer ----------------------------------------------------------------

/// Opens the byte-stream transport a session is built on.
///
/// Swapping the dialer routes every session through a different network
/// stack (a sandboxed socket layer, a proxy, an in-memory pipe in tests).
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, address: &str) -> io::Result<BoxedStream>;
}

#[async_trait]
impl<D> Dialer for Arc<D>
where
    D: Dialer + ?Sized,
{
    async fn dial(&self, address: &str) -> io::Result<BoxedStream> {
        (**self).dial(address).await
    }
}

// -----------------------------------------------------------------------------
// ----- TcpDialer -------------------------------------------------------------

/// Native sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;

        Ok(Box::new(stream))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
