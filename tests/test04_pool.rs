use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use sqlite_dal::prelude::*;

async fn pool_on_disk(
    dir: &tempfile::TempDir,
    config: PoolConfig,
) -> Result<ConnectionPool, DbError> {
    let path = dir.path().join("pool.db");
    ConnectionPool::new(path.to_str().expect("utf-8 path"), config).await
}

#[test]
fn test04_fifo_fairness_under_saturation() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool_on_disk(
            &dir,
            PoolConfig::new()
                .with_max_connections(2)
                .with_min_connections(2)
                .with_health_checks(false),
        )
        .await?;

        let g1 = pool.acquire().await?;
        let g2 = pool.acquire().await?;

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let turn = Arc::new(AtomicUsize::new(0));

        let w1 = {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            let turn = Arc::clone(&turn);
            tokio::spawn(async move {
                turn.store(1, Ordering::SeqCst);
                let guard = pool.acquire().await.expect("w1 acquire");
                order.lock().expect("order lock").push(1);
                pool.release(guard).await;
            })
        };
        // Make sure w1 is parked in the waiter queue before w2 arrives.
        while turn.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let w2 = {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let guard = pool.acquire().await.expect("w2 acquire");
                order.lock().expect("order lock").push(2);
                pool.release(guard).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.release(g1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release(g2).await;

        w1.await.expect("w1 join");
        w2.await.expect("w2 join");

        assert_eq!(*order.lock().expect("order lock"), vec![1, 2]);

        let stats = pool.stats().await;
        assert_eq!(stats.waiting_clients, 0);
        assert_eq!(stats.total_created - stats.total_destroyed, stats.total_connections as u64);
        assert_eq!(
            stats.active_connections + stats.idle_connections,
            stats.total_connections
        );

        pool.close().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test04_acquire_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool_on_disk(
            &dir,
            PoolConfig::new()
                .with_max_connections(1)
                .with_min_connections(1)
                .with_acquire_timeout_ms(50)
                .with_health_checks(false),
        )
        .await?;

        let held = pool.acquire().await?;
        let errors_before = pool.stats().await.total_errors;

        let started = Instant::now();
        let result = pool.acquire().await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(DbError::AcquireTimeout(50))));
        assert!(elapsed >= Duration::from_millis(45), "timed out too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "timed out too late: {elapsed:?}");
        assert_eq!(pool.stats().await.total_errors, errors_before + 1);

        pool.release(held).await;
        pool.close().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test04_pool_queries_and_result_cache() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool_on_disk(
            &dir,
            PoolConfig::new()
                .with_min_connections(1)
                .with_health_checks(false),
        )
        .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v INTEGER)", &[])
            .await?;
        pool.execute(
            "INSERT INTO kv (k, v) VALUES (?1, ?2)",
            &[DbValue::Text("hits".into()), DbValue::Int(1)],
        )
        .await?;

        let cache = CacheOptions::keyed("kv-hits").with_ttl_ms(60_000);
        let first = pool
            .select_cached("SELECT v FROM kv WHERE k = ?1", &[DbValue::Text("hits".into())], &cache)
            .await?;
        assert_eq!(first.results[0].get("v"), Some(&DbValue::Int(1)));

        // Mutate behind the cache; the hit must return the cached rows.
        pool.execute(
            "UPDATE kv SET v = ?1 WHERE k = ?2",
            &[DbValue::Int(99), DbValue::Text("hits".into())],
        )
        .await?;
        let second = pool
            .select_cached("SELECT v FROM kv WHERE k = ?1", &[DbValue::Text("hits".into())], &cache)
            .await?;
        assert_eq!(second.results[0].get("v"), Some(&DbValue::Int(1)));

        let stats = pool.stats().await;
        assert!((stats.cache_hit_rate - 0.5).abs() < 1e-9);
        assert!(stats.average_acquire_time_ms >= 0.0);

        pool.close().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test04_waiters_rejected_on_close() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool_on_disk(
            &dir,
            PoolConfig::new()
                .with_max_connections(1)
                .with_min_connections(1)
                .with_acquire_timeout_ms(5_000)
                .with_health_checks(false),
        )
        .await?;

        let held = pool.acquire().await?;
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.close().await;
        let outcome = waiter.await.expect("waiter join");
        assert!(matches!(outcome, Err(DbError::PoolClosing)));

        // Acquire after close fails fast.
        assert!(matches!(pool.acquire().await, Err(DbError::PoolClosing)));

        drop(held);
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test04_idle_reaping_respects_minimum() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool_on_disk(
            &dir,
            PoolConfig::new()
                .with_max_connections(4)
                .with_min_connections(1)
                .with_idle_timeout_ms(50)
                .with_reap_interval_ms(50)
                .with_health_checks(false),
        )
        .await?;

        // Grow the pool to three connections.
        let a = pool.acquire().await?;
        let b = pool.acquire().await?;
        let c = pool.acquire().await?;
        pool.release(a).await;
        pool.release(b).await;
        pool.release(c).await;
        assert_eq!(pool.stats().await.total_connections, 3);

        // Let the reaper shrink it back to the minimum.
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let stats = pool.stats().await;
            if stats.total_connections == 1 {
                assert_eq!(stats.total_created - stats.total_destroyed, 1);
                break;
            }
            assert!(Instant::now() < deadline, "reaper never shrank the pool");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        pool.close().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}
