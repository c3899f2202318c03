use parking_lot::Mutex;
use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::factory::SessionFactory;
use crate::context::{OpContext, sleep_until};

// -----------------------------------------------------------------------------
// ----- PoolConfig ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_total: usize,
    pub max_idle: usize,
    pub min_idle: usize,
    pub block_when_exhausted: bool,
    pub test_on_borrow: bool,
    /// Upper bound on a blocked borrow; `None` waits for the caller's context.
    pub max_wait: Option<Duration>,
}

impl PoolConfig {
    /// `size` sessions at most, half of them (at least one) kept idle.
    pub fn sized(size: usize) -> Self {
        let max_total = size.max(1);
        let idle = (max_total / 2).max(1);
        Self {
            max_total,
            max_idle: idle,
            min_idle: idle,
            block_when_exhausted: true,
            test_on_borrow: true,
            max_wait: None,
        }
    }

    /// One lazily created session, re-created whenever it fails validation.
    pub fn single() -> Self {
        Self {
            max_total: 1,
            max_idle: 1,
            min_idle: 0,
            block_when_exhausted: true,
            test_on_borrow: true,
            max_wait: None,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn non_blocking(mut self) -> Self {
        self.block_when_exhausted = false;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- PoolStats -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: &'static str,
    pub max_total: usize,
    pub idle: usize,
    pub active: usize,
    pub waiting: usize,
    pub closed: bool,
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool --------------------------------------------------------

/// Bounded pool of sessions produced by a [`SessionFactory`].
///
/// `total` counts every live session, idle or borrowed, plus slots reserved
/// for sessions being created; it never exceeds `max_total`. Waiters park on
/// `available`, which is signalled whenever a session goes idle or a slot is
/// freed.
pub struct ConnectionPool<F: SessionFactory> {
    name: &'static str,
    factory: Arc<F>,
    config: PoolConfig,
    state: Mutex<PoolState<F::Session>>,
    available: Notify,
}

struct PoolState<S> {
    idle: VecDeque<S>,
    total: usize,
    waiting: usize,
    closed: bool,
}

enum Slot<S> {
    Idle(S),
    Fresh,
    Wait,
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Static ------------------------------------------------

impl<F: SessionFactory> ConnectionPool<F> {
    pub fn new(name: &'static str, factory: Arc<F>, config: PoolConfig) -> Arc<Self> {
        info!(
            "building pool {name}: max_total={} max_idle={} min_idle={}",
            config.max_total, config.max_idle, config.min_idle
        );
        Arc::new(Self {
            name,
            factory,
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                waiting: 0,
                closed: false,
            }),
            available: Notify::new(),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Public ------------------------------------------------

impl<F: SessionFactory> ConnectionPool<F> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let idle = state.idle.len();
        PoolStats {
            name: self.name,
            max_total: self.config.max_total,
            idle,
            active: state.total.saturating_sub(idle),
            waiting: state.waiting,
            closed: state.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Hands out a validated idle session, a fresh one, or waits for either.
    pub async fn borrow(
        self: &Arc<Self>,
        ctx: &OpContext,
    ) -> Result<PooledSession<F>, PoolError<F::Error>> {
        let deadline = ctx.deadline_within(self.config.max_wait);

        loop {
            if ctx.is_cancelled() {
                return Err(PoolError::Cancelled { pool: self.name });
            }

            // Registered before the state check so a release in between is not lost.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let slot = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::Closed { pool: self.name });
                }

                if let Some(session) = state.idle.pop_back() {
                    Slot::Idle(session)
                } else if state.total < self.config.max_total {
                    state.total += 1;
                    Slot::Fresh
                } else if self.config.block_when_exhausted {
                    Slot::Wait
                } else {
                    return Err(PoolError::Exhausted {
                        pool: self.name,
                        max_total: self.config.max_total,
                    });
                }
            };

            match slot {
                Slot::Idle(session) => {
                    let mut lease = PooledSession::new(self.clone(), session);
                    if !self.config.test_on_borrow || self.factory.validate(lease.session_mut()).await {
                        return self.hand_out(lease).await;
                    }

                    debug!("pool {}: evicting session that failed validation", self.name);
                    lease.evict().await;
                }

                Slot::Fresh => {
                    // Dropping the create future on timeout or cancel drops any
                    // half-built session; the reservation frees its slot.
                    let reservation = Reservation::new(self);
                    let created = tokio::select! {
                        biased;
                        _ = ctx.cancelled() => {
                            return Err(PoolError::Cancelled { pool: self.name });
                        }
                        _ = sleep_until(deadline) => {
                            return Err(PoolError::Timeout { pool: self.name });
                        }
                        created = self.factory.create(ctx) => created,
                    };

                    return match created {
                        Ok(session) => {
                            reservation.disarm();
                            self.hand_out(PooledSession::new(self.clone(), session)).await
                        }
                        Err(source) => Err(PoolError::Create {
                            pool: self.name,
                            source,
                        }),
                    };
                }

                Slot::Wait => {
                    let _waiter = Waiter::new(self);
                    tokio::select! {
                        biased;
                        _ = ctx.cancelled() => {
                            return Err(PoolError::Cancelled { pool: self.name });
                        }
                        _ = &mut notified => {}
                        _ = sleep_until(deadline) => {
                            return Err(PoolError::Timeout { pool: self.name });
                        }
                    }
                }
            }
        }
    }

    /// Fills the idle set up to `min_idle`. Failures are logged and skipped;
    /// borrowers create sessions lazily anyway.
    pub async fn warm_min(self: &Arc<Self>, ctx: &OpContext) {
        let target = {
            let state = self.state.lock();
            self.config.min_idle.saturating_sub(state.idle.len())
        };
        if target == 0 {
            return;
        }

        info!("warming pool {}: creating {target} sessions", self.name);

        for _ in 0..target {
            if !self.try_reserve() {
                break;
            }
            let reservation = Reservation::new(self);

            match self.factory.create(ctx).await {
                Ok(session) => {
                    reservation.disarm();
                    self.give_back(session).await;
                }
                Err(err) => {
                    warn!("failed to warm pool {} session: {err}", self.name);
                }
            }
        }
    }

    /// Destroys idle sessions and refuses further borrows. Sessions still
    /// borrowed are destroyed when they come back.
    pub async fn close(&self) {
        let drained: Vec<F::Session> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len());
            drained
        };

        self.available.notify_waiters();

        info!("closing pool {}: destroying {} idle sessions", self.name, drained.len());
        for session in drained {
            self.factory.destroy(session).await;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Private -----------------------------------------------

impl<F: SessionFactory> ConnectionPool<F> {
    fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.total >= self.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        {
            let mut state = self.state.lock();
            state.total = state.total.saturating_sub(1);
        }
        self.available.notify_one();
    }

    /// Last check before a session leaves the pool: `close` may have run
    /// while it was being created or validated.
    async fn hand_out(&self, lease: PooledSession<F>) -> Result<PooledSession<F>, PoolError<F::Error>> {
        if !self.is_closed() {
            return Ok(lease);
        }

        debug!("pool {}: closed during borrow; destroying session", self.name);
        lease.evict().await;
        Err(PoolError::Closed { pool: self.name })
    }

    async fn give_back(&self, session: F::Session) {
        let surplus = {
            let mut state = self.state.lock();
            if state.closed || state.idle.len() >= self.config.max_idle {
                state.total = state.total.saturating_sub(1);
                Some(session)
            } else {
                state.idle.push_back(session);
                None
            }
        };

        self.available.notify_one();

        if let Some(session) = surplus {
            self.factory.destroy(session).await;
        }
    }

    async fn discard(&self, session: F::Session) {
        self.release_slot();
        self.factory.destroy(session).await;
    }
}

impl<F: SessionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- PooledSession ---------------------------------------------------------

/// A borrowed session. Give it back with [`release`](Self::release) or
/// [`evict`](Self::evict); dropping it returns it on a background task.
pub struct PooledSession<F: SessionFactory> {
    pool: Arc<ConnectionPool<F>>,
    session: Option<F::Session>,
}

impl<F: SessionFactory> PooledSession<F> {
    fn new(pool: Arc<ConnectionPool<F>>, session: F::Session) -> Self {
        Self {
            pool,
            session: Some(session),
        }
    }

    pub fn pool_name(&self) -> &'static str {
        self.pool.name
    }

    pub fn session_mut(&mut self) -> &mut F::Session {
        self.session
            .as_mut()
            .expect("pooled session already handed back")
    }

    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(session).await;
        }
    }

    /// For sessions the caller knows are broken: destroy and free the slot.
    pub async fn evict(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.discard(session).await;
        }
    }
}

impl<F: SessionFactory> Drop for PooledSession<F> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let pool = self.pool.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pool.give_back(session).await;
                });
            }
            Err(_) => {
                warn!("pool {}: session dropped outside a runtime", pool.name);
                drop(session);
                pool.release_slot();
            }
        }
    }
}

impl<F: SessionFactory> fmt::Debug for PooledSession<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("pool", &self.pool.name)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Guards ------------------------------------------------------

// Gives a reserved slot back unless a session was created to fill it.
struct Reservation<'a, F: SessionFactory> {
    pool: &'a ConnectionPool<F>,
    armed: bool,
}

impl<'a, F: SessionFactory> Reservation<'a, F> {
    fn new(pool: &'a ConnectionPool<F>) -> Self {
        Self { pool, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<F: SessionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

struct Waiter<'a, F: SessionFactory> {
    pool: &'a ConnectionPool<F>,
}

impl<'a, F: SessionFactory> Waiter<'a, F> {
    fn new(pool: &'a ConnectionPool<F>) -> Self {
        pool.state.lock().waiting += 1;
        Self { pool }
    }
}

impl<F: SessionFactory> Drop for Waiter<'_, F> {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PoolError<E> {
    #[error("pool '{pool}' exhausted: all {max_total} sessions in use")]
    Exhausted { pool: &'static str, max_total: usize },

    #[error("timed out waiting for a session from pool '{pool}'")]
    Timeout { pool: &'static str },

    #[error("borrow from pool '{pool}' cancelled")]
    Cancelled { pool: &'static str },

    #[error("pool '{pool}' is closed")]
    Closed { pool: &'static str },

    #[error("failed to create session for pool '{pool}': {source}")]
    Create { pool: &'static str, source: E },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    #[derive(Debug, Error)]
    #[error("refused")]
    struct Refused;

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        validated: AtomicUsize,
        reject_validation: AtomicBool,
        refuse_create: AtomicBool,
        create_delay: Mutex<Option<Duration>>,
        invalid: Mutex<HashSet<usize>>,
    }

    impl CountingFactory {
        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        type Session = usize;
        type Error = Refused;

        async fn create(&self, _ctx: &OpContext) -> Result<usize, Refused> {
            let delay = *self.create_delay.lock();
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            if self.refuse_create.load(Ordering::SeqCst) {
                return Err(Refused);
            }
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        async fn destroy(&self, _session: usize) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        async fn validate(&self, session: &mut usize) -> bool {
            self.validated.fetch_add(1, Ordering::SeqCst);
            !self.reject_validation.load(Ordering::SeqCst) && !self.invalid.lock().contains(session)
        }
    }

    fn pool(config: PoolConfig) -> (Arc<CountingFactory>, Arc<ConnectionPool<CountingFactory>>) {
        let factory = Arc::new(CountingFactory::default());
        let pool = ConnectionPool::new("test", factory.clone(), config);
        (factory, pool)
    }

    fn assert_bounded(pool: &ConnectionPool<CountingFactory>) {
        let stats = pool.stats();
        assert!(
            stats.active + stats.idle <= stats.max_total,
            "bound violated: {stats:?}"
        );
    }

    #[test]
    fn sizing_policy() {
        let cfg = PoolConfig::sized(10);
        assert_eq!((cfg.max_total, cfg.max_idle, cfg.min_idle), (10, 5, 5));

        let cfg = PoolConfig::sized(1);
        assert_eq!((cfg.max_total, cfg.max_idle, cfg.min_idle), (1, 1, 1));

        let cfg = PoolConfig::sized(0);
        assert_eq!(cfg.max_total, 1);
        assert!(cfg.block_when_exhausted && cfg.test_on_borrow);
    }

    #[tokio::test]
    async fn creates_lazily_and_reuses_idle() {
        let (factory, pool) = pool(PoolConfig::sized(4));
        let ctx = OpContext::new();
        assert_eq!(factory.created(), 0);

        let mut lease = pool.borrow(&ctx).await.unwrap();
        assert_eq!(*lease.session_mut(), 0);
        assert_eq!(pool.stats().active, 1);
        lease.release().await;

        let stats = pool.stats();
        assert_eq!((stats.idle, stats.active), (1, 0));

        let mut lease = pool.borrow(&ctx).await.unwrap();
        assert_eq!(*lease.session_mut(), 0);
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.validated.load(Ordering::SeqCst), 1);
        lease.release().await;
    }

    #[tokio::test]
    async fn close_during_create_fails_the_borrow() {
        let (factory, pool) = pool(PoolConfig::sized(2));
        *factory.create_delay.lock() = Some(Duration::from_millis(100));

        let borrower = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.borrow(&OpContext::new()).await.map(|lease| lease.pool_name()) })
        };
        sleep(Duration::from_millis(20)).await;
        pool.close().await;

        let result = borrower.await.unwrap();
        assert!(matches!(result, Err(PoolError::Closed { .. })), "got {result:?}");
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.destroyed(), 1);

        let stats = pool.stats();
        assert_eq!((stats.idle, stats.active), (0, 0));
    }

    #[tokio::test]
    async fn close_during_validation_fails_the_borrow() {
        struct SlowValidate(Arc<CountingFactory>);

        #[async_trait]
        impl SessionFactory for SlowValidate {
            type Session = usize;
            type Error = Refused;

            async fn create(&self, ctx: &OpContext) -> Result<usize, Refused> {
                self.0.create(ctx).await
            }

            async fn destroy(&self, session: usize) {
                self.0.destroy(session).await
            }

            async fn validate(&self, _session: &mut usize) -> bool {
                sleep(Duration::from_millis(100)).await;
                true
            }
        }

        let counts = Arc::new(CountingFactory::default());
        let pool = ConnectionPool::new("test", Arc::new(SlowValidate(counts.clone())), PoolConfig::sized(2));
        pool.borrow(&OpContext::new()).await.unwrap().release().await;

        let borrower = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.borrow(&OpContext::new()).await.map(|lease| lease.pool_name()) })
        };
        sleep(Duration::from_millis(20)).await;
        pool.close().await;

        let result = borrower.await.unwrap();
        assert!(matches!(result, Err(PoolError::Closed { .. })), "got {result:?}");
        assert_eq!(counts.destroyed(), 1);
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn slow_create_is_bounded_by_deadline() {
        let (factory, pool) = pool(PoolConfig::sized(1));
        *factory.create_delay.lock() = Some(Duration::from_millis(500));

        let started = tokio::time::Instant::now();
        let ctx = OpContext::new().with_timeout(Duration::from_millis(20));
        let result = pool.borrow(&ctx).await;

        assert!(matches!(result, Err(PoolError::Timeout { .. })), "got {result:?}");
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(pool.stats().active, 0);

        // the abandoned create left its slot free
        *factory.create_delay.lock() = None;
        pool.borrow(&OpContext::new()).await.unwrap().release().await;
    }

    #[tokio::test]
    async fn slow_create_is_bounded_by_max_wait() {
        let (factory, pool) = pool(PoolConfig::sized(1).with_max_wait(Some(Duration::from_millis(20))));
        *factory.create_delay.lock() = Some(Duration::from_millis(500));

        let result = pool.borrow(&OpContext::new()).await;
        assert!(matches!(result, Err(PoolError::Timeout { .. })), "got {result:?}");
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn cancel_during_create_frees_the_slot() {
        let (factory, pool) = pool(PoolConfig::sized(1));
        *factory.create_delay.lock() = Some(Duration::from_millis(500));

        let ctx = OpContext::new();
        let canceller = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(20)).await;
                ctx.cancel();
            })
        };

        let result = pool.borrow(&ctx).await;
        canceller.await.unwrap();
        assert!(matches!(result, Err(PoolError::Cancelled { .. })), "got {result:?}");
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn invalid_idle_session_is_replaced() {
        let (factory, pool) = pool(PoolConfig::sized(2));
        let ctx = OpContext::new();

        pool.borrow(&ctx).await.unwrap().release().await;
        factory.invalid.lock().insert(0);

        let mut lease = pool.borrow(&ctx).await.unwrap();
        assert_eq!(*lease.session_mut(), 1);
        assert_eq!(factory.destroyed(), 1);
        assert_bounded(&pool);
        lease.release().await;

        let stats = pool.stats();
        assert_eq!((stats.idle, stats.active), (1, 0));
    }

    #[tokio::test]
    async fn surplus_beyond_max_idle_is_destroyed() {
        let (factory, pool) = pool(PoolConfig::sized(4));
        let ctx = OpContext::new();

        let mut leases = Vec::new();
        for _ in 0..4 {
            leases.push(pool.borrow(&ctx).await.unwrap());
        }
        for lease in leases {
            lease.release().await;
        }

        assert_eq!(pool.stats().idle, 2);
        assert_eq!(factory.destroyed(), 2);
    }

    #[tokio::test]
    async fn non_blocking_pool_fails_fast() {
        let (_, pool) = pool(PoolConfig::sized(1).non_blocking());
        let ctx = OpContext::new();

        let held = pool.borrow(&ctx).await.unwrap();
        let err = pool.borrow(&ctx).await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { max_total: 1, .. }));
        held.release().await;
    }

    #[tokio::test]
    async fn waiter_is_served_after_release() {
        let (factory, pool) = pool(PoolConfig::sized(1));
        let ctx = OpContext::new();

        let held = pool.borrow(&ctx).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut lease = pool.borrow(&OpContext::new()).await.unwrap();
                let id = *lease.session_mut();
                lease.release().await;
                id
            })
        };

        while pool.stats().waiting == 0 {
            tokio::task::yield_now().await;
        }
        held.release().await;

        let id = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(id, 0);
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn cancelled_waiter_returns_promptly_and_takes_nothing() {
        let (_, pool) = pool(PoolConfig::sized(1));
        let held = pool.borrow(&OpContext::new()).await.unwrap();

        let ctx = OpContext::new();
        let waiter = {
            let pool = pool.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { pool.borrow(&ctx).await.map(|_| ()) })
        };

        while pool.stats().waiting == 0 {
            tokio::task::yield_now().await;
        }
        ctx.cancel();

        let err = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, PoolError::Cancelled { .. }));
        assert_eq!(pool.stats().waiting, 0);

        held.release().await;
        let stats = pool.stats();
        assert_eq!((stats.idle, stats.active), (1, 0));
    }

    #[tokio::test]
    async fn blocked_borrow_times_out() {
        let (_, pool) = pool(PoolConfig::sized(1).with_max_wait(Some(Duration::from_millis(20))));
        let held = pool.borrow(&OpContext::new()).await.unwrap();

        let err = pool.borrow(&OpContext::new()).await.unwrap_err();
        assert!(matches!(err, PoolError::Timeout { .. }));

        let ctx = OpContext::new().with_timeout(Duration::from_millis(20));
        let err = pool.borrow(&ctx).await.unwrap_err();
        assert!(matches!(err, PoolError::Timeout { .. }));

        held.release().await;
    }

    #[tokio::test]
    async fn close_destroys_idle_and_rejects_borrows() {
        let (factory, pool) = pool(PoolConfig::sized(4));
        let ctx = OpContext::new();

        let a = pool.borrow(&ctx).await.unwrap();
        let b = pool.borrow(&ctx).await.unwrap();
        let outstanding = pool.borrow(&ctx).await.unwrap();
        a.release().await;
        b.release().await;

        pool.close().await;
        assert_eq!(factory.destroyed(), 2);
        assert!(matches!(pool.borrow(&ctx).await.unwrap_err(), PoolError::Closed { .. }));

        outstanding.release().await;
        assert_eq!(factory.destroyed(), 3);

        let stats = pool.stats();
        assert!(stats.closed);
        assert_eq!((stats.idle, stats.active), (0, 0));

        // idempotent
        pool.close().await;
        assert_eq!(factory.destroyed(), 3);
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let (_, pool) = pool(PoolConfig::sized(1));
        let held = pool.borrow(&OpContext::new()).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.borrow(&OpContext::new()).await.map(|_| ()) })
        };
        while pool.stats().waiting == 0 {
            tokio::task::yield_now().await;
        }

        pool.close().await;
        let err = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, PoolError::Closed { .. }));
        held.release().await;
    }

    #[tokio::test]
    async fn evict_frees_capacity() {
        let (factory, pool) = pool(PoolConfig::sized(1).non_blocking());
        let ctx = OpContext::new();

        pool.borrow(&ctx).await.unwrap().evict().await;
        assert_eq!(factory.destroyed(), 1);

        let mut lease = pool.borrow(&ctx).await.unwrap();
        assert_eq!(*lease.session_mut(), 1);
        lease.release().await;
    }

    #[tokio::test]
    async fn failed_create_frees_its_slot() {
        let (factory, pool) = pool(PoolConfig::sized(1).non_blocking());
        let ctx = OpContext::new();

        factory.refuse_create.store(true, Ordering::SeqCst);
        let err = pool.borrow(&ctx).await.unwrap_err();
        assert!(matches!(err, PoolError::Create { .. }));
        assert_eq!(pool.stats().active, 0);

        factory.refuse_create.store(false, Ordering::SeqCst);
        pool.borrow(&ctx).await.unwrap().release().await;
    }

    #[tokio::test]
    async fn dropped_lease_is_returned_in_background() {
        let (_, pool) = pool(PoolConfig::sized(2));
        drop(pool.borrow(&OpContext::new()).await.unwrap());

        for _ in 0..100 {
            if pool.stats().idle == 1 {
                break;
            }
            sleep(Duration::from_millis(1)).await;
        }
        let stats = pool.stats();
        assert_eq!((stats.idle, stats.active), (1, 0));
    }

    #[tokio::test]
    async fn warm_min_fills_idle_set() {
        let (factory, pool) = pool(PoolConfig::sized(6));
        pool.warm_min(&OpContext::new()).await;

        assert_eq!(factory.created(), 3);
        assert_eq!(pool.stats().idle, 3);

        // already warm
        pool.warm_min(&OpContext::new()).await;
        assert_eq!(factory.created(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bound_holds_under_pressure() {
        let (factory, pool) = pool(PoolConfig::sized(4));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let lease = pool.borrow(&OpContext::new()).await.unwrap();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert_bounded(&pool);

                    sleep(Duration::from_millis(1)).await;

                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    lease.release().await;
                    assert_bounded(&pool);
                }
            }));
        }

        for task in tasks {
            timeout(Duration::from_secs(10), task).await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(factory.created() - factory.destroyed() <= 4);
        let stats = pool.stats();
        assert_eq!((stats.active, stats.waiting), (0, 0));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
