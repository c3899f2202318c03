use async_trait::async_trait;

use super::connection_pool::{PoolError, PoolStats, PooledSession};
use super::factory::SessionFactory;
use crate::context::OpContext;

pub type BorrowResult<F> = Result<PooledSession<F>, PoolError<<F as SessionFactory>::Error>>;

/// Which kind of work a session is borrowed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Short metadata commands: list, mkdir, rename, delete, upload.
    Control,
    /// Long-running ranged downloads.
    Transfer,
}

/// Source of sessions for the operation layer. Implementations differ only
/// in how many sessions they keep and how lanes map onto them.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    type Factory: SessionFactory;

    async fn borrow(&self, lane: Lane, ctx: &OpContext) -> BorrowResult<Self::Factory>;

    /// Idempotent.
    async fn shutdown(&self, ctx: &OpContext);

    fn stats(&self) -> Vec<PoolStats>;
}
