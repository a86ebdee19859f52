use super::*;
use std::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};
use std::time::Duration;

struct CountingConnector {
    opened: Arc<StdAtomicUsize>,
}

impl Connector for CountingConnector {
    type Conn = u64;

    async fn connect(&self) -> Result<u64, PoolError> {
        Ok(self.opened.fetch_add(1, StdOrdering::Relaxed) as u64)
    }
}

fn small_config() -> PoolConfig {
    PoolConfig {
        min_size: 1,
        max_size: 2,
        idle_timeout: Duration::from_millis(20),
        max_lifetime: Duration::from_secs(3600),
        acquire_timeout: Duration::from_millis(100),
        janitor_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn acquire_and_release_reuses_connection() {
    let opened = Arc::new(StdAtomicUsize::new(0));
    let pool = Pool::connect(
        CountingConnector {
            opened: Arc::clone(&opened),
        },
        small_config(),
    )
    .await
    .unwrap();

    assert_eq!(pool.live_count(), 1);
    {
        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, 0);
    }
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(opened.load(StdOrdering::Relaxed), 1);
}

#[tokio::test]
async fn acquire_beyond_max_size_times_out() {
    let opened = Arc::new(StdAtomicUsize::new(0));
    let mut config = small_config();
    config.max_size = 1;
    config.min_size = 1;
    let pool = Pool::connect(
        CountingConnector {
            opened: Arc::clone(&opened),
        },
        config,
    )
    .await
    .unwrap();

    let held = pool.acquire().await.unwrap();
    let second = pool.acquire().await;
    assert!(matches!(second, Err(PoolError::Timeout { .. })));
    drop(held);
}

#[tokio::test]
async fn drop_on_error_path_still_releases() {
    let opened = Arc::new(StdAtomicUsize::new(0));
    let pool = Pool::connect(
        CountingConnector {
            opened: Arc::clone(&opened),
        },
        small_config(),
    )
    .await
    .unwrap();

    async fn fallible(pool: &Pool<CountingConnector>) -> Result<(), PoolError> {
        let _conn = pool.acquire().await?;
        Err(PoolError::ConnectFailed {
            reason: "simulated".into(),
        })
    }

    let _ = fallible(&pool).await;
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn shutdown_drains_idle_and_rejects_new_acquires() {
    let opened = Arc::new(StdAtomicUsize::new(0));
    let pool = Pool::connect(
        CountingConnector {
            opened: Arc::clone(&opened),
        },
        small_config(),
    )
    .await
    .unwrap();

    pool.shutdown();
    assert_eq!(pool.idle_count(), 0);
    assert!(matches!(
        pool.acquire().await,
        Err(PoolError::ShuttingDown)
    ));
}

#[tokio::test]
async fn janitor_reaps_idle_connections_above_min_size() {
    let opened = Arc::new(StdAtomicUsize::new(0));
    let mut config = small_config();
    config.min_size = 1;
    config.max_size = 3;
    config.idle_timeout = Duration::from_millis(10);
    config.janitor_interval = Duration::from_millis(5);
    let pool = Pool::connect(
        CountingConnector {
            opened: Arc::clone(&opened),
        },
        config,
    )
    .await
    .unwrap();

    {
        let extra = pool.acquire().await.unwrap();
        let _extra2 = pool.acquire().await.unwrap();
        drop(extra);
    }
    assert_eq!(pool.live_count(), 2);

    let handle = pool.start_janitor();
    tokio::time::sleep(Duration::from_millis(60)).await;
    // at least the floor connection should survive
    assert!(pool.live_count() >= 1);
    handle.abort();
}
