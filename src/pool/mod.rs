//! Bounded connection pool with idle/lifetime garbage collection.
//!
//! Generic over a [`Connector`] so the pool can hand out whatever client type
//! the caller's backend needs (a vector-store client in production, an
//! in-memory stub under the `mock` feature). Acquisition is scoped: a
//! [`PooledConnection`] returns itself to the pool on drop, so release
//! happens on every exit path — success, error, or cancellation — without
//! the caller doing anything special.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::PoolError;

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default cadence at which the background janitor sweeps idle connections.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// A thing that can open a fresh backend connection.
///
/// Native `async fn in trait`: implementors return `impl Future + Send`
/// rather than boxing through `async_trait`.
pub trait Connector: Send + Sync + 'static {
    /// The connection type handed out by the pool.
    type Conn: Send + 'static;

    /// Opens a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Conn, PoolError>> + Send;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
    pub janitor_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            acquire_timeout: Duration::from_secs(5),
            janitor_interval: DEFAULT_JANITOR_INTERVAL,
        }
    }
}

struct Slot<T> {
    conn: T,
    created_at: Instant,
    last_used: Instant,
}

struct Shared<C: Connector> {
    connector: C,
    config: PoolConfig,
    idle: Mutex<VecDeque<Slot<C::Conn>>>,
    live_count: AtomicUsize,
    semaphore: Semaphore,
    shutdown: AtomicBool,
    janitor_running: AtomicBool,
}

/// Bounded pool of `C::Conn` connections.
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> Pool<C> {
    /// Builds a pool and eagerly establishes `min_size` connections.
    pub async fn connect(connector: C, config: PoolConfig) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            connector,
            semaphore: Semaphore::new(config.max_size),
            idle: Mutex::new(VecDeque::with_capacity(config.max_size)),
            live_count: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            janitor_running: AtomicBool::new(false),
            config,
        });

        let pool = Self { shared };
        for _ in 0..pool.shared.config.min_size {
            let conn = pool.shared.connector.connect().await?;
            let now = Instant::now();
            pool.shared.idle.lock().push_back(Slot {
                conn,
                created_at: now,
                last_used: now,
            });
            pool.shared.live_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(pool)
    }

    /// Acquires a connection, creating one if the pool is below `max_size`
    /// and no idle connection is available. Fails with
    /// [`PoolError::Timeout`] if none becomes available within
    /// `acquire_timeout`.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }

        let start = Instant::now();
        let permit = tokio::time::timeout(
            self.shared.config.acquire_timeout,
            Arc::clone(&self.shared).acquire_permit(),
        )
        .await
        .map_err(|_| PoolError::Timeout {
            waited_ms: start.elapsed().as_millis() as u64,
        })??;

        let slot = self.shared.idle.lock().pop_front();
        let (conn, created_at) = match slot {
            Some(s) => (s.conn, s.created_at),
            None => {
                let conn = self.shared.connector.connect().await?;
                self.shared.live_count.fetch_add(1, Ordering::Relaxed);
                (conn, Instant::now())
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            created_at,
            shared: Some(Arc::clone(&self.shared)),
            _permit: Some(permit),
        })
    }

    /// Number of connections currently live (idle + checked out).
    pub fn live_count(&self) -> usize {
        self.shared.live_count.load(Ordering::Relaxed)
    }

    /// Number of idle connections currently sitting in the pool.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Starts the idle/lifetime janitor (no-op if already running).
    pub fn start_janitor(&self) -> tokio::task::JoinHandle<()> {
        // AcqRel: swap needs both load and store semantics so only one
        // janitor task starts per pool, even if start_janitor is called
        // from multiple places concurrently.
        if self.shared.janitor_running.swap(true, Ordering::AcqRel) {
            return tokio::spawn(async {});
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(shared.config.janitor_interval);
            loop {
                interval.tick().await;
                // Acquire: synchronizes with the Release store in shutdown()
                // so we observe it promptly and stop sweeping.
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                shared.sweep();
            }
            shared.janitor_running.store(false, Ordering::Release);
        })
    }

    /// Idempotently closes all idle connections and marks the pool shut
    /// down; subsequent `acquire()` calls fail with [`PoolError::ShuttingDown`].
    pub fn shutdown(&self) {
        // Release: publishes shutdown so the janitor and acquire() observe
        // it with the matching Acquire loads above.
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = self.shared.idle.lock().drain(..).count();
        self.shared
            .live_count
            .fetch_sub(drained, Ordering::Relaxed);
        info!(drained, "pool shut down, idle connections closed");
    }
}

impl<C: Connector> Shared<C> {
    async fn acquire_permit(
        self: Arc<Self>,
    ) -> Result<tokio::sync::OwnedSemaphorePermit, PoolError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::ShuttingDown)
    }

    fn sweep(&self) {
        let now = Instant::now();
        let mut idle = self.idle.lock();
        let live = self.live_count.load(Ordering::Relaxed);
        let floor = self.config.min_size;
        let mut kept = VecDeque::with_capacity(idle.len());
        let mut closed = 0usize;

        while let Some(slot) = idle.pop_front() {
            let expired_lifetime = now.duration_since(slot.created_at) >= self.config.max_lifetime;
            let expired_idle = now.duration_since(slot.last_used) >= self.config.idle_timeout;
            let would_breach_floor = live - closed <= floor;

            if expired_lifetime || (expired_idle && !would_breach_floor) {
                closed += 1;
                debug!(expired_lifetime, expired_idle, "janitor closing connection");
            } else {
                kept.push_back(slot);
            }
        }
        *idle = kept;
        drop(idle);

        if closed > 0 {
            self.live_count.fetch_sub(closed, Ordering::Relaxed);
            warn!(closed, live_before = live, "janitor reaped connections");
        }
    }
}

/// A connection on loan from a [`Pool`].
///
/// Returns itself to the pool's idle queue on drop unless the pool has
/// already been shut down, which covers the success, error, and
/// cancellation exit paths uniformly.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Conn>,
    created_at: Instant,
    shared: Option<Arc<Shared<C>>>,
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Conn;
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl<C: Connector> PooledConnection<C> {
    /// Explicitly releases the connection back to the pool. Equivalent to
    /// dropping the guard; provided for call sites that want the release to
    /// read explicitly.
    pub fn release(self) {
        drop(self)
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let (Some(conn), Some(shared)) = (self.conn.take(), self.shared.take()) else {
            return;
        };
        if shared.shutdown.load(Ordering::Acquire) {
            shared.live_count.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        shared.idle.lock().push_back(Slot {
            conn,
            created_at: self.created_at,
            last_used: Instant::now(),
        });
    }
}
