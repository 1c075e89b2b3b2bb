// src/crawl/mod.rs
// =============================================================================
// This module runs one crawl from seeds to final snapshot.
//
// Lifecycle:
//   INIT -> RUNNING -> DRAINED   (frontier empty, nothing in flight)
//                   -> TIMED_OUT (deadline fired first)
//        -> TERMINATED           (final snapshot written)
//
// While RUNNING, three things happen side by side:
// - the worker pool drains the frontier
// - a ticker writes a snapshot every `snapshot_interval`
// - a deadline timer waits to cancel everything
//
// Both terminal states lead to exactly one final snapshot.
// =============================================================================

mod address;
mod dispatch;
mod filters;
mod frontier;
mod pool;
mod store;

pub use address::Address;
pub use filters::Software;
pub use store::Instance;

use crate::config::{ConfigError, CrawlConfig};
use crate::net::{ProtocolClient, Transport};
use crate::output::{SnapshotError, SnapshotWriter};
use dispatch::Dispatcher;
use filters::{DiscoveryFilter, Qualification};
use frontier::Frontier;
use pool::{PoolExit, PoolSettings, PoolStats, WorkerPool};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::ResultStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    Running,
    Drained,
    TimedOut,
    Terminated,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrawlState::Init => "INIT",
            CrawlState::Running => "RUNNING",
            CrawlState::Drained => "DRAINED",
            CrawlState::TimedOut => "TIMED_OUT",
            CrawlState::Terminated => "TERMINATED",
        })
    }
}

// How many addresses ended up in each bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub crawled: usize,
    pub qualified: usize,
    pub unsupported: usize,
    pub legacy: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl From<&PoolStats> for OutcomeCounts {
    fn from(stats: &PoolStats) -> Self {
        Self {
            crawled: stats.crawled.load(Ordering::Relaxed),
            qualified: stats.qualified.load(Ordering::Relaxed),
            unsupported: stats.unsupported.load(Ordering::Relaxed),
            legacy: stats.legacy.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            timed_out: stats.timed_out.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// DRAINED or TIMED_OUT
    pub finished_as: CrawlState,
    pub visited: usize,
    pub elapsed: Duration,
    pub outcomes: OutcomeCounts,
    /// The final snapshot, sorted by host
    pub instances: Vec<Instance>,
}

pub struct Crawler<T> {
    config: CrawlConfig,
    frontier: Arc<Frontier>,
    store: Arc<ResultStore>,
    pool: WorkerPool<T>,
    writer: SnapshotWriter,
    state: CrawlState,
}

impl<T: Transport + 'static> Crawler<T> {
    // Wires the frontier, store, dispatcher and pool together
    //
    // The config is validated here as well, since the pool relies on
    // 1 <= min_concurrency <= max_concurrency. Nothing is fetched until
    // `run` is called.
    pub fn new(config: CrawlConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let frontier = Arc::new(Frontier::new());
        let store = Arc::new(ResultStore::new());

        let dispatcher = Arc::new(Dispatcher::new(
            ProtocolClient::new(transport, config.request_timeout),
            Arc::clone(&frontier),
            Arc::clone(&store),
            DiscoveryFilter::new(config.recency_days),
            Qualification::new(config.min_active_users),
        ));
        let pool = WorkerPool::new(
            PoolSettings {
                min_workers: config.min_concurrency,
                max_workers: config.max_concurrency,
                task_timeout: config.task_timeout,
                max_retries: config.max_retries,
            },
            Arc::clone(&frontier),
            dispatcher,
        );
        let writer = SnapshotWriter::new(config.output_dir.clone());

        Ok(Self {
            config,
            frontier,
            store,
            pool,
            writer,
            state: CrawlState::Init,
        })
    }

    fn enter(&mut self, next: CrawlState) {
        info!(from = %self.state, to = %next, "crawl state");
        self.state = next;
    }

    // Runs the crawl to completion
    //
    // Returns: the report, or an error if the final snapshot could not be
    // written. Per-server failures never surface here.
    pub async fn run(mut self) -> Result<CrawlReport, SnapshotError> {
        let started = Instant::now();

        for seed in &self.config.seeds {
            self.frontier.try_enqueue(Address::normalize(seed));
        }

        self.enter(CrawlState::Running);
        info!(
            seeds = self.config.seeds.len(),
            deadline_secs = self.config.deadline.as_secs(),
            output = %self.writer.pretty_path().display(),
            "crawl started"
        );

        // The guard stops the ticker even if this future is dropped early
        let ticker_stop = CancellationToken::new();
        let ticker = spawn_snapshot_ticker(
            self.writer.clone(),
            Arc::clone(&self.store),
            self.config.snapshot_interval,
            ticker_stop.clone(),
        );
        let ticker_guard = ticker_stop.drop_guard();

        // Scoped so the pool borrow ends before the state changes again
        let finished_as = {
            let cancel = CancellationToken::new();
            let pool_run = self.pool.run(cancel.clone());
            tokio::pin!(pool_run);
            let deadline = tokio::time::sleep(self.config.deadline);
            tokio::pin!(deadline);

            let exit = tokio::select! {
                exit = &mut pool_run => Some(exit),
                _ = &mut deadline => None,
            };
            match exit {
                Some(PoolExit::Drained) => CrawlState::Drained,
                Some(PoolExit::Cancelled) => CrawlState::TimedOut,
                None => {
                    cancel.cancel();
                    pool_run.await;
                    CrawlState::TimedOut
                }
            }
        };
        self.enter(finished_as);

        drop(ticker_guard);
        if let Err(e) = ticker.await {
            warn!(error = %e, "snapshot ticker did not shut down cleanly");
        }

        let instances = self.store.snapshot();
        self.writer.save(instances.clone()).await?;
        self.enter(CrawlState::Terminated);

        let report = CrawlReport {
            finished_as,
            visited: self.frontier.visited(),
            elapsed: started.elapsed(),
            outcomes: OutcomeCounts::from(self.pool.stats().as_ref()),
            instances,
        };
        info!(
            visited = report.visited,
            instances = report.instances.len(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "crawl finished"
        );
        Ok(report)
    }
}

// Periodic snapshots while the crawl is running
//
// A failed periodic write is logged and the crawl keeps going; the next tick
// or the final write will try again.
fn spawn_snapshot_ticker(
    writer: SnapshotWriter,
    store: Arc<ResultStore>,
    every: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let rows = store.snapshot();
                    let count = rows.len();
                    match writer.save(rows).await {
                        Ok(()) => info!(instances = count, "periodic snapshot written"),
                        Err(e) => warn!(error = %e, "periodic snapshot failed"),
                    }
                }
            }
        }
    })
}
