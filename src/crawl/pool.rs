// src/crawl/pool.rs
// =============================================================================
// Bounded worker pool that drains the frontier.
//
// How it works:
// 1. `min_workers` persistent workers start right away and live until the
//    pool stops.
// 2. Whenever the frontier changes, the supervisor loop looks at
//    pending + in-flight work and spawns burst workers up to `max_workers`.
//    Burst workers exit as soon as they find the queue empty.
// 3. Each claimed address runs under a task timeout. A timed-out attempt is
//    retried up to `max_retries` more times, then dropped silently.
// 4. The pool finishes when nothing is queued and nothing is in flight
//    (drained), or when the cancellation token fires (deadline).
//
// A worker that panics only takes its own address down: the frontier claim
// is released by its Drop impl and the supervisor replaces the worker.
// =============================================================================

use super::address::Address;
use super::dispatch::{Dispatcher, Outcome};
use super::frontier::Frontier;
use crate::net::Transport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task exceeded its {0:?} budget")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    pub task_timeout: Duration,
    pub max_retries: u32,
}

// Why the pool stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExit {
    Drained,
    Cancelled,
}

// Per-outcome counters, shared by all workers
#[derive(Debug, Default)]
pub struct PoolStats {
    pub crawled: AtomicUsize,
    pub qualified: AtomicUsize,
    pub unsupported: AtomicUsize,
    pub legacy: AtomicUsize,
    pub failed: AtomicUsize,
    pub timed_out: AtomicUsize,
}

impl PoolStats {
    fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Crawled { qualified, .. } => {
                if *qualified {
                    self.qualified.fetch_add(1, Ordering::Relaxed);
                }
                &self.crawled
            }
            Outcome::Unsupported { .. } => &self.unsupported,
            Outcome::LemmyLegacy => &self.legacy,
            Outcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct WorkerPool<T> {
    settings: PoolSettings,
    frontier: Arc<Frontier>,
    dispatcher: Arc<Dispatcher<T>>,
    stats: Arc<PoolStats>,
}

impl<T: Transport + 'static> WorkerPool<T> {
    pub fn new(settings: PoolSettings, frontier: Arc<Frontier>, dispatcher: Arc<Dispatcher<T>>) -> Self {
        Self {
            settings,
            frontier,
            dispatcher,
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    // Runs until the frontier drains or `cancel` fires
    //
    // When it returns no worker is running any more.
    pub async fn run(&self, cancel: CancellationToken) -> PoolExit {
        let stop = cancel.child_token();
        let mut workers = JoinSet::new();
        let mut next_id = 0usize;

        let exit = loop {
            let changed = self.frontier.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let load = self.frontier.load();
            if load.is_drained() {
                break PoolExit::Drained;
            }

            let wanted = (load.pending + load.in_flight)
                .clamp(self.settings.min_workers, self.settings.max_workers);
            while workers.len() < wanted {
                let persistent = workers.len() < self.settings.min_workers;
                workers.spawn(self.worker(next_id, persistent, stop.clone()));
                next_id += 1;
            }

            tokio::select! {
                _ = cancel.cancelled() => break PoolExit::Cancelled,
                _ = &mut changed => {}
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "crawl worker panicked");
                        }
                    }
                }
            }
        };

        stop.cancel();
        while workers.join_next().await.is_some() {}
        exit
    }

    fn worker(
        &self,
        id: usize,
        persistent: bool,
        stop: CancellationToken,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let frontier = Arc::clone(&self.frontier);
        let dispatcher = Arc::clone(&self.dispatcher);
        let stats = Arc::clone(&self.stats);
        let settings = self.settings;

        async move {
            debug!(worker = id, persistent, "worker started");
            loop {
                let changed = frontier.changed();
                tokio::pin!(changed);
                changed.as_mut().enable();

                if stop.is_cancelled() {
                    break;
                }

                match frontier.claim() {
                    Some(claim) => {
                        let address = claim.address().clone();
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = process_with_retry(&dispatcher, &address, &settings, &stats) => {}
                        }
                        drop(claim);
                    }
                    None if !persistent => break,
                    None => {
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = &mut changed => {}
                        }
                    }
                }
            }
            debug!(worker = id, "worker stopped");
        }
    }
}

// One address, with the task timeout and the retry budget applied
async fn process_with_retry<T: Transport>(
    dispatcher: &Dispatcher<T>,
    address: &Address,
    settings: &PoolSettings,
    stats: &PoolStats,
) {
    for attempt in 0..=settings.max_retries {
        let result = tokio::time::timeout(settings.task_timeout, dispatcher.process(address))
            .await
            .map_err(|_| TaskError::Timeout(settings.task_timeout));

        match result {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Failed(e) => debug!(%address, error = %e, "dropping address"),
                    Outcome::Unsupported { software } => {
                        debug!(%address, %software, "unsupported software")
                    }
                    Outcome::LemmyLegacy => debug!(%address, "lemmy 1.x is not crawled"),
                    Outcome::Crawled { discovered, qualified } => {
                        debug!(%address, discovered, qualified, "crawled")
                    }
                }
                stats.record(&outcome);
                return;
            }
            Err(e) => warn!(%address, attempt = attempt + 1, error = %e, "task attempt failed"),
        }
    }

    debug!(%address, retries = settings.max_retries, "giving up on address");
    stats.timed_out.fetch_add(1, Ordering::Relaxed);
}
