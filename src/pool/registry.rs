use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};

use tokio::task::JoinSet;

use super::ConnectionPool;

/// Process-wide registry of open pools, keyed by database path.
static POOLS: LazyLock<Mutex<HashMap<String, ConnectionPool>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<String, ConnectionPool>> {
    match POOLS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(super) fn register(path: &str, pool: ConnectionPool) {
    registry().insert(path.to_owned(), pool);
}

pub(super) fn unregister(path: &str) {
    registry().remove(path);
}

/// Close every registered pool, in parallel, and wait for all of them.
pub async fn close_all_pools() {
    let pools: Vec<ConnectionPool> = registry().drain().map(|(_, pool)| pool).collect();
    let mut tasks = JoinSet::new();
    for pool in pools {
        tasks.spawn(async move { pool.close().await });
    }
    while tasks.join_next().await.is_some() {}
}
