//! Bounded-concurrency attachment download pool
//!
//! A dispatcher task consumes submitted jobs FIFO and acquires an owned
//! semaphore permit before spawning each worker, so no more than the
//! configured number of fetches is ever in flight. Workers run the fetch
//! under the shared retry policy — throttles are waited out while the permit
//! is held, transient failures retry a bounded number of times, permanent
//! failures are terminal — then record the attachment path in the store and
//! report an outcome. [`DownloadCoordinator::drain`] blocks cooperatively on
//! the outcome channel until every submitted job is terminal.

mod fetcher;

pub use fetcher::{AttachmentFetcher, target_file_name};

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry;
use crate::store::Store;
use crate::types::{DownloadJob, DrainOutcome, Event, RecordId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Terminal result of one job, reported back to `drain`
struct JobOutcome {
    record_id: RecordId,
    result: std::result::Result<u64, String>,
}

/// Bounded-concurrency pool scheduling attachment fetches
pub struct DownloadCoordinator {
    job_tx: mpsc::UnboundedSender<DownloadJob>,
    outcome_rx: Mutex<mpsc::UnboundedReceiver<JobOutcome>>,
    submitted: AtomicU64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

/// Everything a worker needs, cloned per spawned job
#[derive(Clone)]
struct WorkerContext {
    fetcher: Arc<AttachmentFetcher>,
    store: Arc<Store>,
    retry: RetryConfig,
    outcome_tx: mpsc::UnboundedSender<JobOutcome>,
    event_tx: broadcast::Sender<Event>,
    in_flight: Arc<AtomicUsize>,
}

impl DownloadCoordinator {
    /// Create the pool and start its dispatcher task
    pub fn new(
        fetcher: AttachmentFetcher,
        store: Arc<Store>,
        config: &Config,
        cancel: CancellationToken,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<DownloadJob>();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<JobOutcome>();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let ctx = WorkerContext {
            fetcher: Arc::new(fetcher),
            store,
            retry: config.retry.clone(),
            outcome_tx,
            event_tx,
            in_flight: Arc::clone(&in_flight),
        };
        let limit = Arc::new(Semaphore::new(config.downloads.max_concurrent));
        tokio::spawn(dispatch_loop(job_rx, limit, ctx, cancel.clone()));

        Self {
            job_tx,
            outcome_rx: Mutex::new(outcome_rx),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight,
            cancel,
        }
    }

    /// Enqueue a job; returns [`Error::ShuttingDown`] once cancelled
    pub fn submit(&self, job: DownloadJob) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        // Count before sending so a fast worker's outcome can never race
        // ahead of the submitted tally observed by drain.
        self.submitted.fetch_add(1, Ordering::SeqCst);
        if self.job_tx.send(job).is_err() {
            self.submitted.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    /// Wait until every submitted job is terminal, returning aggregate counts
    ///
    /// After cancellation only jobs that were already admitted keep running;
    /// drain waits for those and then returns the counts gathered so far,
    /// leaving never-admitted jobs uncounted.
    pub async fn drain(&self) -> DrainOutcome {
        let mut rx = self.outcome_rx.lock().await;

        loop {
            if self.completed.load(Ordering::SeqCst) >= self.submitted.load(Ordering::SeqCst) {
                break;
            }

            if self.cancel.is_cancelled() {
                // Tally whatever already finished, then wait out the admitted
                // stragglers only; never-admitted jobs produce no outcome.
                while let Ok(outcome) = rx.try_recv() {
                    self.tally(outcome);
                }
                if self.completed.load(Ordering::SeqCst) >= self.submitted.load(Ordering::SeqCst)
                    || self.in_flight.load(Ordering::SeqCst) == 0
                {
                    break;
                }
                match rx.recv().await {
                    Some(outcome) => self.tally(outcome),
                    None => break,
                }
                continue;
            }

            let outcome = tokio::select! {
                outcome = rx.recv() => outcome,
                _ = self.cancel.cancelled() => continue,
            };

            match outcome {
                Some(outcome) => self.tally(outcome),
                None => break,
            }
        }

        DrainOutcome {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    fn tally(&self, outcome: JobOutcome) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        match outcome.result {
            Ok(bytes) => {
                tracing::debug!(record_id = %outcome.record_id, bytes, "job reached done");
                self.succeeded.fetch_add(1, Ordering::SeqCst)
            }
            Err(error) => {
                tracing::debug!(record_id = %outcome.record_id, error, "job reached failed");
                self.failed.fetch_add(1, Ordering::SeqCst)
            }
        };
    }
}

/// Pop jobs FIFO, gate them on the semaphore, spawn a worker per admission
async fn dispatch_loop(
    mut job_rx: mpsc::UnboundedReceiver<DownloadJob>,
    limit: Arc<Semaphore>,
    ctx: WorkerContext,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        ctx.in_flight.fetch_add(1, Ordering::SeqCst);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = run_job(&ctx, &job).await;
            // Outcome must be visible before the in-flight count drops, or a
            // cancelled drain could observe zero in flight and miss it.
            let _ = ctx.outcome_tx.send(outcome);
            ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// Run one job to a terminal state
async fn run_job(ctx: &WorkerContext, job: &DownloadJob) -> JobOutcome {
    let record_id = job.media.record_id;
    tracing::debug!(%record_id, target = %job.target.display(), "download job started");

    let media = &job.media;
    let target = job.target.as_path();
    let fetcher = &*ctx.fetcher;
    let fetched = retry::fetch_with_policy(&ctx.retry, || fetcher.fetch(media, target), |_| {}).await;

    let result = match fetched {
        Ok(bytes) => match ctx.store.update_media_path(record_id, &job.manifest_path).await {
            Ok(()) => {
                ctx.event_tx
                    .send(Event::AttachmentStored {
                        record_id,
                        bytes,
                        path: job.target.clone(),
                    })
                    .ok();
                Ok(bytes)
            }
            Err(e) => {
                tracing::error!(%record_id, error = %e, "failed to record attachment path");
                Err(e.to_string())
            }
        },
        Err(e) => {
            tracing::warn!(%record_id, error = %e, "download job failed");
            Err(e.to_string())
        }
    };

    if let Err(error) = &result {
        ctx.event_tx
            .send(Event::AttachmentFailed {
                record_id,
                error: error.clone(),
            })
            .ok();
    }

    JobOutcome { record_id, result }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
