use async_trait::async_trait;
use std::{fmt, sync::Arc, time::Duration};
use tracing::info;

use super::connection_pool::{ConnectionPool, PoolConfig, PoolStats};
use super::factory::SessionFactory;
use super::provider::{BorrowResult, Lane, SessionProvider};
use crate::bootstrap;
use crate::context::OpContext;

// -----------------------------------------------------------------------------
// ----- PoolSizing ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSizing {
    pub general: usize,
    pub download: usize,
    pub max_wait: Option<Duration>,
}

impl PoolSizing {
    pub fn control(&self) -> PoolConfig {
        PoolConfig::sized(self.general).with_max_wait(self.max_wait)
    }

    pub fn transfer(&self) -> PoolConfig {
        PoolConfig::sized(self.download).with_max_wait(self.max_wait)
    }
}

// -----------------------------------------------------------------------------
// ----- DualPoolManager -------------------------------------------------------

/// Keeps downloads off the sessions that serve metadata calls, so a burst of
/// transfers cannot starve listing or renames.
pub struct DualPoolManager<F: SessionFactory> {
    control: Arc<ConnectionPool<F>>,
    transfer: Arc<ConnectionPool<F>>,
}

// -----------------------------------------------------------------------------
// ----- DualPoolManager: Static -----------------------------------------------

impl<F: SessionFactory> DualPoolManager<F> {
    /// Builds both pools without touching the network.
    pub fn new(factory: Arc<F>, sizing: &PoolSizing) -> Self {
        Self {
            control: ConnectionPool::new("control", factory.clone(), sizing.control()),
            transfer: ConnectionPool::new("transfer", factory, sizing.transfer()),
        }
    }

    /// Bootstrap check first; pools only exist once it passes. Then both
    /// pools are warmed to `min_idle`.
    pub async fn init(factory: Arc<F>, sizing: &PoolSizing, ctx: &OpContext) -> Result<Self, F::Error> {
        bootstrap::verify(factory.as_ref(), ctx).await?;

        let manager = Self::new(factory, sizing);
        tokio::join!(manager.control.warm_min(ctx), manager.transfer.warm_min(ctx));

        info!(
            "session pools ready: control={} transfer={}",
            sizing.general, sizing.download
        );
        Ok(manager)
    }
}

// -----------------------------------------------------------------------------
// ----- DualPoolManager: Public -----------------------------------------------

impl<F: SessionFactory> DualPoolManager<F> {
    pub fn control(&self) -> &Arc<ConnectionPool<F>> {
        &self.control
    }

    pub fn transfer(&self) -> &Arc<ConnectionPool<F>> {
        &self.transfer
    }

    fn pool(&self, lane: Lane) -> &Arc<ConnectionPool<F>> {
        match lane {
            Lane::Control => &self.control,
            Lane::Transfer => &self.transfer,
        }
    }
}

#[async_trait]
impl<F: SessionFactory> SessionProvider for DualPoolManager<F> {
    type Factory = F;

    async fn borrow(&self, lane: Lane, ctx: &OpContext) -> BorrowResult<F> {
        self.pool(lane).borrow(ctx).await
    }

    async fn shutdown(&self, _ctx: &OpContext) {
        // close() never fails, so one pool cannot keep the other open
        self.control.close().await;
        self.transfer.close().await;
    }

    fn stats(&self) -> Vec<PoolStats> {
        vec![self.control.stats(), self.transfer.stats()]
    }
}

impl<F: SessionFactory> fmt::Debug for DualPoolManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualPoolManager")
            .field("control", &self.control)
            .field("transfer", &self.transfer)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
