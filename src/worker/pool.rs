//! Bounded-concurrency worker pool.
//!
//! Submissions go into a bounded queue and return immediately. A single
//! dispatcher drains the queue in order and waits for a free execution slot
//! before starting each unit, so with one slot units run strictly FIFO and
//! never overlap.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::JobError;

type Work = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

struct QueuedWork {
    job_id: Uuid,
    work: Work,
}

/// Runs submitted units of work with at most `max_concurrent_jobs` in flight.
pub struct WorkerPool {
    /// `None` once shutdown has started.
    tx: Mutex<Option<mpsc::Sender<QueuedWork>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    slots: usize,
}

impl WorkerPool {
    /// Create the pool and spawn its dispatcher. Must be called inside a Tokio runtime.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let slots = config.max_concurrent_jobs.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatch(rx, Arc::new(Semaphore::new(slots)), cancel.clone()));
        info!(slots, queue_capacity = config.queue_capacity, "Worker pool started");

        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            cancel,
            slots,
        })
    }

    /// Number of execution slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Queue a unit of work for `job_id`.
    ///
    /// Never blocks. Fails with `PoolRejected` when the pool is shutting down
    /// or its queue is full; the unit is then not run.
    pub fn submit<F, Fut>(&self, job_id: Uuid, work: F) -> Result<(), JobError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = self.tx.lock().map_err(|_| JobError::PoolRejected {
            id: job_id,
            reason: "worker pool lock poisoned".into(),
        })?;
        let tx = guard.as_ref().ok_or_else(|| JobError::PoolRejected {
            id: job_id,
            reason: "worker pool is shutting down".into(),
        })?;

        let queued = QueuedWork {
            job_id,
            work: Box::new(move |token| work(token).boxed()),
        };

        tx.try_send(queued).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "worker queue is full",
                mpsc::error::TrySendError::Closed(_) => "worker pool is stopped",
            };
            warn!(job_id = %job_id, reason, "Submission rejected");
            JobError::PoolRejected {
                id: job_id,
                reason: reason.into(),
            }
        })?;

        debug!(job_id = %job_id, "Work queued");
        Ok(())
    }

    /// Stop accepting work, then wait for every accepted unit to finish.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().ok().and_then(|mut guard| guard.take());
        drop(tx);

        let dispatcher = self.dispatcher.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker pool dispatcher ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }

    /// Signal running units to stop early. Queued units still start and see
    /// an already-cancelled token.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<QueuedWork>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let mut running = JoinSet::new();

    while let Some(QueuedWork { job_id, work }) = rx.recv().await {
        let permit = match Arc::clone(&slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Reap finished units so the set does not grow unbounded.
        while let Some(result) = running.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        let token = cancel.child_token();
        debug!(job_id = %job_id, "Starting work");
        running.spawn(async move {
            work(token).await;
            drop(permit);
        });
    }

    while let Some(result) = running.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Worker task ended abnormally");
        }
    }
}
