//! Bounded pool for CPU-bound handler work.

use crate::error::HandlerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

/// Runs blocking jobs off the async runtime with a wall-clock limit.
///
/// A job that overruns is abandoned: the caller gets `Timeout` right away,
/// while the worker thread finishes on its own and only then releases its
/// permit.
#[derive(Clone)]
pub struct ComputePool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ComputePool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `job` on a blocking worker. Waiting for a permit counts
    /// against the limit.
    pub async fn run<F, T>(&self, job: F) -> Result<T, HandlerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|e| HandlerError::Internal(e.into()))?;

            tokio::task::spawn_blocking(move || {
                let result = job();
                drop(permit);
                result
            })
            .await
            .map_err(|e| HandlerError::Internal(e.into()))
        };

        match timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Compute job timed out");
                Err(HandlerError::Timeout(self.timeout))
            }
        }
    }
}

impl Default for ComputePool {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_job() {
        let pool = ComputePool::default();
        assert_eq!(pool.run(|| 6 * 7).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_overrunning_job_times_out() {
        let pool = ComputePool::new(1, Duration::from_millis(50));
        let result = pool
            .run(|| std::thread::sleep(Duration::from_millis(300)))
            .await;

        assert!(matches!(result, Err(HandlerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_abandoned_job_holds_permit() {
        let pool = ComputePool::new(1, Duration::from_millis(50));
        let _ = pool
            .run(|| std::thread::sleep(Duration::from_millis(300)))
            .await;

        // The single worker is still busy, so this one waits out its limit.
        let result = pool.run(|| 1).await;
        assert!(matches!(result, Err(HandlerError::Timeout(_))));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(tokio_test::assert_ok!(pool.run(|| 2).await), 2);
    }
}
