use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connection pool backed by a reconnecting [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;

        let addr_label = info.addr.to_string();
        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection manager ready at {}", addr_label);

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }
}

/// Outcome of a bounded Redis call.
#[derive(Debug)]
pub enum TimedOut<E> {
    /// The inner future finished with an error.
    Failed(E),
    /// The deadline passed first.
    Elapsed,
}

/// Run a Redis future with a deadline.
///
/// The connection manager retries dropped connections forever, so callers that
/// must answer promptly wrap each command in this.
pub async fn with_timeout<T, E, F>(
    op: &'static str,
    limit: Duration,
    fut: F,
) -> std::result::Result<T, TimedOut<E>>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimedOut::Failed(err)),
        Err(_) => {
            warn!(operation = op, timeout_ms = limit.as_millis() as u64, "Redis call timed out");
            Err(TimedOut::Elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_value_through() {
        let out: std::result::Result<u8, TimedOut<()>> =
            with_timeout("get", Duration::from_millis(50), async { Ok(7) }).await;
        assert!(matches!(out, Ok(7)));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_error_through() {
        let out: std::result::Result<(), TimedOut<&str>> =
            with_timeout("set", Duration::from_millis(50), async { Err("boom") }).await;
        assert!(matches!(out, Err(TimedOut::Failed("boom"))));
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let out: std::result::Result<(), TimedOut<()>> =
            with_timeout("exists", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(out, Err(TimedOut::Elapsed)));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        assert!(RedisPool::connect("not a url").await.is_err());
    }
}
