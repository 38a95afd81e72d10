//! Background Rebuild Pool
//!
//! A fixed set of worker tasks draining a bounded queue of rebuild jobs.
//! Callers enqueue a self-contained future (the key, the fallback and a
//! handle on the store, nothing else) and return immediately.
//!
//! # Lifecycle
//!
//! ```text
//! submit ──try_send──▶ [ bounded queue ] ──▶ worker 0..N ──▶ job.await
//!    │                                              │
//!    └─ full ─▶ Error::RebuildQueueFull             └─ Ok / Err / panic ─▶ metrics
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::metrics::CacheMetrics;
use crate::config::RebuildPoolConfig;
use crate::error::{Error, Result};

/// An owned rebuild job
pub type RebuildJob = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

struct RebuildTask {
    key: String,
    job: RebuildJob,
}

/// Bounded pool of rebuild workers
pub struct RebuildPool {
    config: RebuildPoolConfig,
    task_tx: mpsc::Sender<RebuildTask>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<CacheMetrics>,
}

impl RebuildPool {
    /// Start the workers. Must be called from within a Tokio runtime.
    pub fn new(config: RebuildPoolConfig, metrics: Arc<CacheMetrics>) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shutdown = CancellationToken::new();

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    rx.clone(),
                    shutdown.clone(),
                    metrics.clone(),
                ))
            })
            .collect();

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            "Started rebuild pool"
        );

        Self {
            config,
            task_tx: tx,
            shutdown,
            workers: Mutex::new(handles),
            metrics,
        }
    }

    /// Enqueue a rebuild without waiting for it.
    ///
    /// Fails with [`Error::RebuildQueueFull`] when the queue is at capacity;
    /// the job is dropped in that case.
    pub fn submit<F>(&self, key: impl Into<String>, job: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let key = key.into();
        let task = RebuildTask {
            key: key.clone(),
            job: Box::pin(job),
        };

        match self.task_tx.try_send(task) {
            Ok(()) => {
                self.metrics.record_rebuild_scheduled();
                debug!(key = %key, "Queued rebuild");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::RebuildQueueFull(key)),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::Internal(format!("rebuild pool closed, dropped {}", key)))
            }
        }
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.config.queue_capacity.max(1) - self.task_tx.capacity()
    }

    pub fn config(&self) -> &RebuildPoolConfig {
        &self.config
    }

    /// Stop the workers and wait for them to exit.
    ///
    /// Jobs already running finish; queued jobs are dropped and any rebuild
    /// lock they carried expires through its TTL.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Rebuild worker ended abnormally");
            }
        }
        info!("Rebuild pool stopped");
    }
}

impl Drop for RebuildPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    worker: usize,
    task_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<RebuildTask>>>,
    shutdown: CancellationToken,
    metrics: Arc<CacheMetrics>,
) {
    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            task = async {
                let mut rx = task_rx.lock().await;
                rx.recv().await
            } => task,
        };

        let Some(task) = task else {
            break;
        };

        match AssertUnwindSafe(task.job).catch_unwind().await {
            Ok(Ok(())) => {
                metrics.record_rebuild_completed();
                info!(worker, key = %task.key, "Rebuild completed");
            }
            Ok(Err(e)) => {
                metrics.record_rebuild_failed();
                error!(worker, key = %task.key, error = %e, "Rebuild failed");
            }
            Err(_) => {
                metrics.record_rebuild_failed();
                error!(worker, key = %task.key, "Rebuild panicked");
            }
        }
    }
    debug!(worker, "Rebuild worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_jobs_run_and_are_counted() {
        let metrics = Arc::new(CacheMetrics::new());
        let pool = RebuildPool::new(RebuildPoolConfig::default(), metrics.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let runs = runs.clone();
            pool.submit(format!("cache:shop:{}", i), async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
        pool.submit("cache:shop:bad", async { Err(Error::Database("down".into())) })
            .unwrap();

        wait_until(|| {
            let s = metrics.snapshot();
            s.rebuilds_completed + s.rebuilds_failed == 6
        })
        .await;

        let snapshot = metrics.snapshot();
        assert_eq!(runs.load(Ordering::SeqCst), 5);
        assert_eq!(snapshot.rebuilds_scheduled, 6);
        assert_eq!(snapshot.rebuilds_failed, 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let metrics = Arc::new(CacheMetrics::new());
        let config = RebuildPoolConfig {
            workers: 1,
            queue_capacity: 4,
        };
        let pool = RebuildPool::new(config, metrics.clone());

        pool.submit("boom", async {
            if true {
                panic!("rebuild exploded");
            }
            Ok(())
        })
        .unwrap();
        pool.submit("after", async { Ok(()) }).unwrap();

        wait_until(|| metrics.snapshot().rebuilds_completed == 1).await;
        assert_eq!(metrics.snapshot().rebuilds_failed, 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_is_refused() {
        let metrics = Arc::new(CacheMetrics::new());
        let config = RebuildPoolConfig {
            workers: 1,
            queue_capacity: 1,
        };
        let pool = RebuildPool::new(config, metrics.clone());
        let gate = CancellationToken::new();

        // Occupy the worker, then fill the single queue slot
        let blocker = gate.clone();
        pool.submit("busy", async move {
            blocker.cancelled().await;
            Ok(())
        })
        .unwrap();
        wait_until(|| pool.queued() == 0).await;
        pool.submit("queued", async { Ok(()) }).unwrap();

        let err = pool.submit("overflow", async { Ok(()) }).unwrap_err();
        assert!(matches!(err, Error::RebuildQueueFull(ref key) if key == "overflow"));

        gate.cancel();
        wait_until(|| metrics.snapshot().rebuilds_completed == 2).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = RebuildPool::new(RebuildPoolConfig::default(), Arc::new(CacheMetrics::new()));
        pool.shutdown().await;

        assert!(pool.submit("late", async { Ok(()) }).is_err());
    }
}
