use async_trait::async_trait;
use std::{fmt, sync::Arc, time::Duration};
use tracing::info;

use super::connection_pool::{ConnectionPool, PoolConfig, PoolStats};
use super::factory::SessionFactory;
use super::provider::{BorrowResult, Lane, SessionProvider};
use crate::bootstrap;
use crate::context::OpContext;

// -----------------------------------------------------------------------------
// ----- SharedSession ---------------------------------------------------------

/// One session for every lane, connected on first use and logged in again
/// whenever it fails validation. Concurrent callers queue behind it.
pub struct SharedSession<F: SessionFactory> {
    pool: Arc<ConnectionPool<F>>,
}

impl<F: SessionFactory> SharedSession<F> {
    pub fn new(factory: Arc<F>, max_wait: Option<Duration>) -> Self {
        Self {
            pool: ConnectionPool::new("shared", factory, PoolConfig::single().with_max_wait(max_wait)),
        }
    }

    pub async fn init(factory: Arc<F>, max_wait: Option<Duration>, ctx: &OpContext) -> Result<Self, F::Error> {
        bootstrap::verify(factory.as_ref(), ctx).await?;

        info!("single shared session mode ready");
        Ok(Self::new(factory, max_wait))
    }
}

#[async_trait]
impl<F: SessionFactory> SessionProvider for SharedSession<F> {
    type Factory = F;

    async fn borrow(&self, _lane: Lane, ctx: &OpContext) -> BorrowResult<F> {
        self.pool.borrow(ctx).await
    }

    async fn shutdown(&self, _ctx: &OpContext) {
        self.pool.close().await;
    }

    fn stats(&self) -> Vec<PoolStats> {
        vec![self.pool.stats()]
    }
}

impl<F: SessionFactory> fmt::Debug for SharedSession<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession").field("pool", &self.pool).finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
