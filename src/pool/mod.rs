//! Session pooling: the generic bounded pool, the factory it drives, and the
//! two providers operations borrow from.

pub mod connection_pool;
pub mod dual;
pub mod factory;
pub mod provider;
pub mod shared;

pub use connection_pool::{ConnectionPool, PoolConfig, PoolError, PoolStats, PooledSession};
pub use dual::{DualPoolManager, PoolSizing};
pub use factory::{Endpoint, FtpSessionFactory, SessionError, SessionFactory};
pub use provider::{BorrowResult, Lane, SessionProvider};
pub use shared::SharedSession;
