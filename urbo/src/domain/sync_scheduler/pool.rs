//! Fixed-size worker pool draining one FIFO job queue.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Job = BoxFuture<'static, ()>;
type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>;

/// Raised when submitting to a pool that has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

/// Bounded set of worker tasks sharing one queue.
///
/// Each worker runs one job to completion before taking the next, so a job
/// that sleeps keeps its worker occupied. Jobs start in submission order.
/// Must be created inside a Tokio runtime.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver: SharedReceiver = Arc::new(AsyncMutex::new(receiver));
        let workers = (0..size)
            .map(|index| tokio::spawn(worker_loop(index, Arc::clone(&receiver))))
            .collect();
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a job. Callable from any thread.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.sender.lock().map_err(|_| PoolClosed)?;
        let sender = guard.as_ref().ok_or(PoolClosed)?;
        sender.send(Box::pin(job)).map_err(|_| PoolClosed)
    }

    /// Close the queue, let workers drain queued jobs, and join them.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => Vec::new(),
        };
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "sync worker ended abnormally");
            }
        }
    }
}

async fn worker_loop(index: usize, receiver: SharedReceiver) {
    debug!(worker = index, "sync worker started");
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else { break };
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!(worker = index, "sync job panicked");
        }
    }
    debug!(worker = index, "sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    #[rstest]
    #[tokio::test]
    async fn single_worker_runs_jobs_in_submission_order() {
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for value in 0..5 {
            let order = Arc::clone(&order);
            pool.submit(async move {
                order.lock().expect("order mutex").push(value);
            })
            .expect("pool open");
        }

        pool.shutdown().await;

        assert_eq!(*order.lock().expect("order mutex"), vec![0, 1, 2, 3, 4]);
    }

    #[rstest]
    #[tokio::test]
    async fn busy_workers_queue_further_jobs() {
        let pool = WorkerPool::new(2);
        let release = Arc::new(Notify::new());
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let release = Arc::clone(&release);
            let entered_tx = entered_tx.clone();
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                entered_tx.send(()).expect("entered channel");
                release.notified().await;
                active.fetch_sub(1, Ordering::SeqCst);
            })
            .expect("pool open");
        }

        entered_rx.recv().await.expect("first job entered");
        entered_rx.recv().await.expect("second job entered");
        assert!(
            timeout(Duration::from_millis(50), entered_rx.recv())
                .await
                .is_err(),
            "third job must wait for a free worker"
        );

        release.notify_one();
        entered_rx.recv().await.expect("third job entered");
        release.notify_one();
        release.notify_one();
        pool.shutdown().await;

        assert_eq!(max_active.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let pool = WorkerPool::new(2);
        pool.shutdown().await;

        assert_eq!(pool.submit(async {}), Err(PoolClosed));
    }

    #[rstest]
    #[tokio::test]
    async fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        pool.submit(async { panic!("boom") }).expect("pool open");
        {
            let ran = Arc::clone(&ran);
            pool.submit(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .expect("pool open");
        }

        pool.shutdown().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 1);
    }
}
