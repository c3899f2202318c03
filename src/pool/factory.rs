use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::{OpContext, sleep_until};
use crate::net::Dialer;
use crate::protocol::{Connector, FtpControl, RemoteError};

// -----------------------------------------------------------------------------
// ----- SessionFactory --------------------------------------------------------

/// Lifecycle hooks a [`ConnectionPool`](super::ConnectionPool) drives.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn create(&self, ctx: &OpContext) -> Result<Self::Session, Self::Error>;

    /// Best effort; failures are logged, never returned.
    async fn destroy(&self, session: Self::Session);

    /// `false` means evict instead of reuse.
    async fn validate(&self, session: &mut Self::Session) -> bool;
}

// -----------------------------------------------------------------------------
// ----- Endpoint --------------------------------------------------------------

#[derive(Clone)]
pub struct Endpoint {
    pub address: String,
    pub username: String,
    password: SecretString,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password,
        }
    }

    fn password_exposed(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- FtpSessionFactory -----------------------------------------------------

/// Dials, greets and logs in one FTP control connection per `create`.
pub struct FtpSessionFactory<C, D: ?Sized> {
    endpoint: Endpoint,
    connector: Arc<C>,
    dialer: Arc<D>,
    connect_timeout: Duration,
}

impl<C, D> FtpSessionFactory<C, D>
where
    C: Connector,
    D: Dialer + ?Sized,
{
    pub fn new(endpoint: Endpoint, connector: Arc<C>, dialer: Arc<D>, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connector,
            dialer,
            connect_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Dial, greeting and login. The caller bounds the whole sequence.
    async fn establish(&self) -> Result<C::Conn, SessionError> {
        let mut conn = self.open().await?;

        if let Err(source) = conn
            .login(&self.endpoint.username, self.endpoint.password_exposed())
            .await
        {
            if let Err(err) = conn.quit().await {
                debug!("quit after failed login to {} failed: {err}", self.endpoint.address);
            }

            let address = self.endpoint.address.clone();
            return Err(if source.is_auth_rejection() {
                SessionError::Auth {
                    address,
                    username: self.endpoint.username.clone(),
                    source,
                }
            } else {
                SessionError::Connect { address, source }
            });
        }

        Ok(conn)
    }

    async fn open(&self) -> Result<C::Conn, SessionError> {
        let address = &self.endpoint.address;
        let dialed = tokio::time::timeout(self.connect_timeout, self.dialer.dial(address)).await;

        let stream = match dialed {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SessionError::Connect {
                    address: address.clone(),
                    source: e.into(),
                });
            }
            Err(_) => {
                return Err(SessionError::ConnectTimeout {
                    address: address.clone(),
                    timeout: self.connect_timeout,
                });
            }
        };

        self.connector
            .handshake(stream)
            .await
            .map_err(|source| SessionError::Connect {
                address: address.clone(),
                source,
            })
    }
}

#[async_trait]
impl<C, D> SessionFactory for FtpSessionFactory<C, D>
where
    C: Connector,
    D: Dialer + ?Sized,
{
    type Session = C::Conn;
    type Error = SessionError;

    async fn create(&self, ctx: &OpContext) -> Result<Self::Session, Self::Error> {
        let conn = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(SessionError::Cancelled),
            _ = sleep_until(ctx.deadline()) => {
                return Err(SessionError::DeadlineExceeded {
                    address: self.endpoint.address.clone(),
                });
            }
            established = self.establish() => established?,
        };

        debug!("ftp session established to {}", self.endpoint.address);
        Ok(conn)
    }

    async fn destroy(&self, mut session: Self::Session) {
        debug!("destroying ftp session to {}", self.endpoint.address);
        if let Err(err) = session.quit().await {
            warn!("quit to {} failed; dropping session anyway: {err}", self.endpoint.address);
        }
    }

    async fn validate(&self, session: &mut Self::Session) -> bool {
        let keep = session.noop().await.is_ok();
        debug!("validated ftp session to {} keep={keep}", self.endpoint.address);
        keep
    }
}

impl<C, D: ?Sized> fmt::Debug for FtpSessionFactory<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSessionFactory")
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: RemoteError,
    },

    #[error("connecting to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("deadline passed while connecting to {address}")]
    DeadlineExceeded { address: String },

    #[error("login as '{username}' rejected by {address}: {source}")]
    Auth {
        address: String,
        username: String,
        source: RemoteError,
    },

    #[error("session creation cancelled")]
    Cancelled,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
