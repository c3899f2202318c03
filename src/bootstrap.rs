//! Checks run before any pool exists: the address must normalize and one
//! session must connect, authenticate and disconnect cleanly.

use tracing::info;

use crate::config::{AddressError, normalize_address};
use crate::context::OpContext;
use crate::pool::SessionFactory;

pub fn resolve_address(raw: &str) -> Result<String, AddressError> {
    normalize_address(raw)
}

/// One-shot create + destroy.
pub async fn verify<F: SessionFactory>(factory: &F, ctx: &OpContext) -> Result<(), F::Error> {
    let session = factory.create(ctx).await?;
    factory.destroy(session).await;

    info!("bootstrap check passed");
    Ok(())
}
