// Pool module - reusable worker-backed connections with FIFO waiters,
// idle reaping, health supervision, and result/statement caching.
//
// - config: tunables and their defaults
// - cache: the TTL result cache and statement-text interning
// - stats: lifetime counters and the acquire-latency window
// - registry: process-wide path -> pool map and close_all_pools

mod cache;
mod config;
mod registry;
mod stats;

pub use cache::{CacheOptions, DEFAULT_RESULT_TTL_MS};
pub use config::PoolConfig;
pub use registry::close_all_pools;
pub use stats::PoolStats;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{DbConnection, PragmaProfile};
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::DbValue;

use cache::{ResultCache, StatementCache};
use stats::StatsCounters;

/// One pooled connection and its bookkeeping.
struct PooledConnection {
    id: u64,
    conn: DbConnection,
    created_at: Instant,
    last_used: Instant,
    in_use: bool,
    query_count: u64,
    error_count: u64,
}

struct Waiter {
    id: u64,
    enqueued_at: Instant,
    respond_to: oneshot::Sender<Result<PoolGuard, DbError>>,
}

struct PoolState {
    connections: HashMap<u64, PooledConnection>,
    available: VecDeque<u64>,
    waiters: VecDeque<Waiter>,
    statements: StatementCache,
    results: ResultCache,
    counters: StatsCounters,
    next_connection_id: u64,
    next_waiter_id: u64,
}

struct PoolInner {
    path: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
    closed: AtomicBool,
    timers: StdMutex<Vec<JoinHandle<()>>>,
}

/// A checked-out pooled connection.
///
/// Return it with [`ConnectionPool::release`]; a guard dropped without an
/// explicit release returns itself to the pool from a background task.
pub struct PoolGuard {
    conn: DbConnection,
    id: u64,
    pool: Weak<PoolInner>,
    released: bool,
}

impl PoolGuard {
    fn new(conn: DbConnection, id: u64, pool: Weak<PoolInner>) -> Self {
        Self {
            conn,
            id,
            pool,
            released: false,
        }
    }

    /// The connection this guard holds.
    #[must_use]
    pub fn connection(&self) -> &DbConnection {
        &self.conn
    }

    /// Pool-internal id of the held connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn defuse(&mut self) {
        self.released = true;
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(inner) = self.pool.upgrade()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            let id = self.id;
            handle.spawn(async move {
                release_slot(&inner, id).await;
            });
        }
    }
}

/// The manager of reusable database connections.
///
/// Waiters are served strictly FIFO; idle connections above the minimum are
/// reaped; unhealthy idle connections are destroyed by a periodic `SELECT 1`
/// probe. Cloning shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open a pool over `path`, eagerly creating `min_connections` and
    /// starting the reaper and health-check timers.
    ///
    /// The pool registers itself in the process-wide registry so
    /// [`close_all_pools`] can find it.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidArgument` for inconsistent bounds, or any
    /// connection-open failure.
    pub async fn new(path: &str, config: PoolConfig) -> Result<Self, DbError> {
        if config.max_connections == 0 {
            return Err(DbError::InvalidArgument(
                "max_connections must be at least 1".into(),
            ));
        }
        if config.min_connections > config.max_connections {
            return Err(DbError::InvalidArgument(
                "min_connections cannot exceed max_connections".into(),
            ));
        }

        let inner = Arc::new(PoolInner {
            path: path.to_owned(),
            state: Mutex::new(PoolState {
                connections: HashMap::new(),
                available: VecDeque::new(),
                waiters: VecDeque::new(),
                statements: StatementCache::default(),
                results: ResultCache::new(config.max_cache_entries),
                counters: StatsCounters::default(),
                next_connection_id: 1,
                next_waiter_id: 1,
            }),
            config,
            closed: AtomicBool::new(false),
            timers: StdMutex::new(Vec::new()),
        });

        {
            let mut state = inner.state.lock().await;
            for _ in 0..inner.config.min_connections {
                let id = open_slot(&inner, &mut state).await?;
                state.available.push_back(id);
            }
        }

        spawn_timers(&inner);
        let pool = Self { inner };
        registry::register(path, pool.clone());
        if pool.inner.config.enable_logging {
            info!(path, "connection pool opened");
        }
        Ok(pool)
    }

    /// The database path this pool serves.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Acquire a connection: reuse an idle one, open a new one below the
    /// cap, or join the FIFO waiter queue.
    ///
    /// # Errors
    ///
    /// `DbError::AcquireTimeout` when no connection frees up within
    /// `acquire_timeout_ms`; `DbError::PoolClosing` during shutdown.
    pub async fn acquire(&self) -> Result<PoolGuard, DbError> {
        let started = Instant::now();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(DbError::PoolClosing);
        }

        let (waiter_id, rx) = {
            let mut state = self.inner.state.lock().await;

            while let Some(id) = state.available.pop_front() {
                if let Some(slot) = state.connections.get_mut(&id) {
                    slot.in_use = true;
                    slot.last_used = Instant::now();
                    let conn = slot.conn.clone();
                    state.counters.acquired += 1;
                    state.counters.record_acquire_latency(elapsed_ms(started));
                    if self.inner.config.enable_logging {
                        debug!(connection = id, "pool acquire: reused idle connection");
                    }
                    return Ok(PoolGuard::new(conn, id, Arc::downgrade(&self.inner)));
                }
            }

            if state.connections.len() < self.inner.config.max_connections {
                let id = open_slot(&self.inner, &mut state).await?;
                let slot = state
                    .connections
                    .get_mut(&id)
                    .ok_or_else(|| DbError::ConnectionError("slot vanished after open".into()))?;
                slot.in_use = true;
                let conn = slot.conn.clone();
                state.counters.acquired += 1;
                state.counters.record_acquire_latency(elapsed_ms(started));
                if self.inner.config.enable_logging {
                    debug!(connection = id, "pool acquire: opened new connection");
                }
                return Ok(PoolGuard::new(conn, id, Arc::downgrade(&self.inner)));
            }

            let (tx, rx) = oneshot::channel();
            let waiter_id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push_back(Waiter {
                id: waiter_id,
                enqueued_at: started,
                respond_to: tx,
            });
            if self.inner.config.enable_logging {
                debug!(waiter = waiter_id, "pool acquire: queued waiter");
            }
            (waiter_id, rx)
        };

        let timeout = Duration::from_millis(self.inner.config.acquire_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DbError::PoolClosing),
            Err(_) => {
                let mut state = self.inner.state.lock().await;
                state.waiters.retain(|w| w.id != waiter_id);
                state.counters.errors += 1;
                Err(DbError::AcquireTimeout(self.inner.config.acquire_timeout_ms))
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// An over-age connection is destroyed; otherwise it goes to the head
    /// waiter, or back on the idle queue.
    pub async fn release(&self, mut guard: PoolGuard) {
        guard.defuse();
        let id = guard.id;
        drop(guard);
        release_slot(&self.inner, id).await;
    }

    /// Run a query on a pooled connection, acquiring and releasing around it.
    ///
    /// # Errors
    ///
    /// Propagates acquire failures and engine errors.
    pub async fn select(&self, sql: &str, params: &[DbValue]) -> Result<ResultSet, DbError> {
        let guard = self.acquire().await?;
        let sql_arc = self.intern_sql(sql).await;
        let result = guard.connection().select_prepared(sql_arc, params).await;
        self.note_outcome(guard.id, result.is_err()).await;
        self.release(guard).await;
        result
    }

    /// Run a query with the TTL result cache consulted first.
    ///
    /// Hits within the entry's TTL skip the engine entirely; misses execute
    /// and populate the cache, evicting FIFO at capacity.
    ///
    /// # Errors
    ///
    /// Propagates acquire failures and engine errors.
    pub async fn select_cached(
        &self,
        sql: &str,
        params: &[DbValue],
        cache: &CacheOptions,
    ) -> Result<ResultSet, DbError> {
        let use_cache = cache.use_cache && self.inner.config.enable_result_cache;
        if use_cache {
            let mut state = self.inner.state.lock().await;
            if let Some(hit) = state.results.get(&cache.cache_key) {
                state.counters.cache_hits += 1;
                if self.inner.config.enable_logging {
                    debug!(key = %cache.cache_key, "result cache hit");
                }
                return Ok(hit);
            }
            state.counters.cache_misses += 1;
        }

        let result = self.select(sql, params).await?;
        if use_cache {
            let mut state = self.inner.state.lock().await;
            state
                .results
                .insert(cache.cache_key.clone(), result.clone(), cache.ttl_ms);
        }
        Ok(result)
    }

    /// Run a DML statement on a pooled connection.
    ///
    /// # Errors
    ///
    /// Propagates acquire failures and engine errors.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<usize, DbError> {
        let guard = self.acquire().await?;
        let sql_arc = self.intern_sql(sql).await;
        let result = guard.connection().dml_prepared(sql_arc, params).await;
        self.note_outcome(guard.id, result.is_err()).await;
        self.release(guard).await;
        result
    }

    /// Current pool statistics.
    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().await;
        let active = state.connections.values().filter(|s| s.in_use).count();
        PoolStats {
            total_connections: state.connections.len(),
            active_connections: active,
            idle_connections: state.connections.len() - active,
            waiting_clients: state.waiters.len(),
            total_created: state.counters.created,
            total_destroyed: state.counters.destroyed,
            total_acquired: state.counters.acquired,
            total_released: state.counters.released,
            total_errors: state.counters.errors,
            average_acquire_time_ms: state.counters.average_acquire_time_ms(),
            cache_hit_rate: state.counters.cache_hit_rate(),
        }
    }

    /// Shut the pool down: stop timers, reject queued waiters with
    /// `PoolClosing`, close every connection, and drop all cached state.
    ///
    /// Idempotent; subsequent calls return immediately.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut timers = match self.inner.timers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for timer in timers.drain(..) {
                timer.abort();
            }
        }

        let mut state = self.inner.state.lock().await;
        while let Some(waiter) = state.waiters.pop_front() {
            let _ = waiter.respond_to.send(Err(DbError::PoolClosing));
        }
        state.statements.clear();
        state.results.clear();
        let closing = state.connections.len() as u64;
        state.connections.clear();
        state.available.clear();
        state.counters.destroyed += closing;
        drop(state);

        registry::unregister(&self.inner.path);
        if self.inner.config.enable_logging {
            info!(path = %self.inner.path, "connection pool closed");
        }
    }

    async fn intern_sql(&self, sql: &str) -> Arc<String> {
        if self.inner.config.enable_statement_cache {
            let mut state = self.inner.state.lock().await;
            state.statements.intern(sql)
        } else {
            Arc::new(sql.to_owned())
        }
    }

    async fn note_outcome(&self, id: u64, failed: bool) {
        let mut state = self.inner.state.lock().await;
        if let Some(slot) = state.connections.get_mut(&id) {
            slot.query_count += 1;
            if failed {
                slot.error_count += 1;
            }
        }
        if failed {
            state.counters.errors += 1;
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Open a connection with the pooled pragma profile and register its slot.
async fn open_slot(inner: &Arc<PoolInner>, state: &mut PoolState) -> Result<u64, DbError> {
    let conn = match DbConnection::open(&inner.path, PragmaProfile::Pooled).await {
        Ok(conn) => conn,
        Err(err) => {
            state.counters.errors += 1;
            return Err(err);
        }
    };
    let id = state.next_connection_id;
    state.next_connection_id += 1;
    let now = Instant::now();
    state.connections.insert(
        id,
        PooledConnection {
            id,
            conn,
            created_at: now,
            last_used: now,
            in_use: false,
            query_count: 0,
            error_count: 0,
        },
    );
    state.counters.created += 1;
    Ok(id)
}

fn destroy_slot(state: &mut PoolState, id: u64) {
    if state.connections.remove(&id).is_some() {
        state.counters.destroyed += 1;
    }
    state.available.retain(|candidate| *candidate != id);
}

async fn release_slot(inner: &Arc<PoolInner>, id: u64) {
    let mut state = inner.state.lock().await;
    state.counters.released += 1;

    let Some(slot) = state.connections.get_mut(&id) else {
        return;
    };
    slot.in_use = false;
    slot.last_used = Instant::now();
    let conn = slot.conn.clone();
    let age = slot.created_at.elapsed();

    if age >= Duration::from_millis(inner.config.max_connection_age_ms) {
        destroy_slot(&mut state, id);
        if inner.config.enable_logging {
            debug!(connection = id, "pool release: destroyed over-age connection");
        }
        return;
    }

    // Hand the connection straight to the longest-waiting client.
    while let Some(waiter) = state.waiters.pop_front() {
        if let Some(slot) = state.connections.get_mut(&id) {
            slot.in_use = true;
            slot.last_used = Instant::now();
        }
        let latency = elapsed_ms(waiter.enqueued_at);
        let guard = PoolGuard::new(conn.clone(), id, Arc::downgrade(inner));
        match waiter.respond_to.send(Ok(guard)) {
            Ok(()) => {
                state.counters.acquired += 1;
                state.counters.record_acquire_latency(latency);
                if inner.config.enable_logging {
                    debug!(
                        connection = id,
                        waiter = waiter.id,
                        "pool release: handed to waiter"
                    );
                }
                return;
            }
            Err(rejected) => {
                // The waiter timed out concurrently; defuse the guard so its
                // drop does not double-release, then try the next waiter.
                if let Ok(mut guard) = rejected {
                    guard.defuse();
                }
            }
        }
    }

    if let Some(slot) = state.connections.get_mut(&id) {
        slot.in_use = false;
    }
    state.available.push_back(id);
}

fn spawn_timers(inner: &Arc<PoolInner>) {
    let reap_interval = Duration::from_millis(inner.config.reap_interval_ms.max(1));

    let weak = Arc::downgrade(inner);
    let reaper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reap_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { return };
            reap_idle(&inner).await;
        }
    });

    let mut timers = vec![reaper];

    if inner.config.enable_health_checks {
        let weak = Arc::downgrade(inner);
        let health = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reap_interval * 2);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { return };
                run_health_checks(&inner).await;
            }
        });
        timers.push(health);
    }

    let mut slot = match inner.timers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = timers;
}

/// Destroy idle connections past the idle timeout while staying at or above
/// the configured minimum, and expire stale result-cache entries.
async fn reap_idle(inner: &Arc<PoolInner>) {
    let mut state = inner.state.lock().await;
    let idle_timeout = Duration::from_millis(inner.config.idle_timeout_ms);

    let stale: Vec<u64> = state
        .connections
        .values()
        .filter(|slot| !slot.in_use && slot.last_used.elapsed() > idle_timeout)
        .map(|slot| slot.id)
        .collect();
    for id in stale {
        if state.connections.len() <= inner.config.min_connections {
            break;
        }
        destroy_slot(&mut state, id);
        if inner.config.enable_logging {
            debug!(connection = id, "reaper: destroyed idle connection");
        }
    }

    state.results.evict_expired();
}

/// Probe every idle connection with `SELECT 1`, destroying the ones that
/// fail (unless they were re-acquired while probing).
async fn run_health_checks(inner: &Arc<PoolInner>) {
    let probes: Vec<(u64, DbConnection)> = {
        let state = inner.state.lock().await;
        state
            .connections
            .values()
            .filter(|slot| !slot.in_use)
            .map(|slot| (slot.id, slot.conn.clone()))
            .collect()
    };

    let mut failed = Vec::new();
    for (id, conn) in probes {
        if conn.select("SELECT 1", &[]).await.is_err() {
            failed.push(id);
        }
    }
    if failed.is_empty() {
        return;
    }

    let mut state = inner.state.lock().await;
    for id in failed {
        state.counters.errors += 1;
        let still_idle = state
            .connections
            .get(&id)
            .is_some_and(|slot| !slot.in_use);
        if still_idle {
            warn!(connection = id, "health check failed; destroying connection");
            destroy_slot(&mut state, id);
        }
    }
}
