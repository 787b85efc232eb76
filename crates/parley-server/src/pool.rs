//! Task queue and worker pool.
//!
//! Inbound frames are queued in true arrival order and processed off the
//! I/O loops by a fixed pool of workers. The queue is an mpsc channel whose
//! receiver is shared behind a mutex, so exactly one worker dequeues at a
//! time and every task is processed exactly once, FIFO. Shutdown is a watch
//! broadcast observed before and after each wait: workers finish the task
//! in hand, then exit without draining the backlog.

use crate::registry::ConnectionId;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One inbound frame awaiting processing.
#[derive(Debug)]
pub struct Task {
    pub conn_id: ConnectionId,
    pub payload: Vec<u8>,
}

/// Fixed-size pool of worker tasks consuming the shared task queue.
pub struct WorkerPool {
    task_tx: mpsc::UnboundedSender<Task>,
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers, each running `handler` on one task at
    /// a time.
    pub fn start<H, Fut>(worker_count: usize, handler: H) -> Self
    where
        H: Fn(Task) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (task_tx, task_rx) = mpsc::unbounded_channel::<Task>();
        let (stop_tx, _) = watch::channel(false);
        let shared_rx = Arc::new(Mutex::new(task_rx));

        let mut handles = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let shared_rx = shared_rx.clone();
            let mut stop_rx = stop_tx.subscribe();
            let handler = handler.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = shared_rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = stop_rx.changed() => None,
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else { break };
                    handler(task).await;
                }
                debug!(worker, "worker exiting");
            }));
        }

        info!(workers = worker_count, "worker pool started");
        Self {
            task_tx,
            stop_tx,
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue an inbound frame at the tail of the queue, waking one idle
    /// worker. Returns false once the pool is stopping.
    pub fn dispatch(&self, conn_id: ConnectionId, payload: Vec<u8>) -> bool {
        if *self.stop_tx.borrow() {
            return false;
        }
        self.task_tx.send(Task { conn_id, payload }).is_ok()
    }

    /// Graceful stop: wake every worker, let in-flight tasks finish, discard
    /// queued-but-unstarted tasks, and join the pool.
    pub async fn stop(&self) {
        if self.stop_tx.send_replace(true) {
            return;
        }
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker join failed");
            }
        }
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn wait_until<F: Fn() -> bool>(deadline_ms: u64, cond: F) -> bool {
        for _ in 0..(deadline_ms / 5) {
            if cond() {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    #[tokio::test]
    async fn single_worker_preserves_fifo_order() {
        let seen: Arc<StdMutex<Vec<u64>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let pool = WorkerPool::start(1, move |task: Task| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(task.conn_id);
            }
        });

        for i in 0..20 {
            assert!(pool.dispatch(i, Vec::new()));
        }
        assert!(wait_until(1000, || seen.lock().unwrap().len() == 20).await);
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<u64>>());
        pool.stop().await;
    }

    #[tokio::test]
    async fn every_task_processed_exactly_once_across_workers() {
        let seen: Arc<StdMutex<Vec<u64>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let pool = WorkerPool::start(4, move |task: Task| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(task.conn_id);
            }
        });

        for i in 0..100 {
            assert!(pool.dispatch(i, Vec::new()));
        }
        assert!(wait_until(2000, || seen.lock().unwrap().len() >= 100).await);

        let mut processed = seen.lock().unwrap().clone();
        processed.sort_unstable();
        assert_eq!(processed, (0..100).collect::<Vec<u64>>());
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_discards_unstarted_tasks_and_finishes_in_flight() {
        let seen: Arc<StdMutex<Vec<u64>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let pool = WorkerPool::start(1, move |task: Task| {
            let sink = sink.clone();
            async move {
                sleep(Duration::from_millis(200)).await;
                sink.lock().unwrap().push(task.conn_id);
            }
        });

        for i in 0..5 {
            assert!(pool.dispatch(i, Vec::new()));
        }
        // Let the worker pick up the first task, then stop mid-flight.
        sleep(Duration::from_millis(50)).await;
        pool.stop().await;

        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert!(!pool.dispatch(99, Vec::new()));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let pool = WorkerPool::start(2, |_task: Task| async {});
        pool.stop().await;
        pool.stop().await;
    }
}
