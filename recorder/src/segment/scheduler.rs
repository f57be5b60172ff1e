use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::stream::{Registry, SessionHandle};

use super::{CycleError, CycleOutcome, Executor};

struct Ticker {
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Fires one segmentation pass over every active stream per interval.
///
/// Each cycle is its own task: a slow stream never delays the timer or the
/// other streams, and a stream whose previous cycle is still running sits
/// the tick out instead of queueing a second one.
pub struct Scheduler {
    registry: Arc<Registry>,
    executor: Arc<Executor>,
    interval: Duration,
    ticker: Mutex<Option<Ticker>>,
    cycles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, executor: Arc<Executor>, interval: Duration) -> Self {
        Self {
            registry,
            executor,
            interval,
            ticker: Mutex::new(None),
            cycles: Mutex::new(Vec::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        lock(&self.ticker).is_some()
    }

    /// Start ticking. The first pass runs one interval from now.
    /// Calling it again while running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = lock(&self.ticker);
        if ticker.is_some() {
            debug!("[scheduler] already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let scheduler = self.clone();
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        let dispatched = scheduler.tick().await;
                        debug!("[scheduler] tick dispatched {} cycles", dispatched);
                    }
                }
            }
        });

        info!("[scheduler] started, interval {:?}", period);
        *ticker = Some(Ticker {
            handle,
            shutdown_tx,
        });
    }

    /// Stop ticking. Cycles already dispatched keep running.
    pub async fn stop(&self) {
        let Some(ticker) = lock(&self.ticker).take() else {
            return;
        };
        if ticker.shutdown_tx.send(()).is_err() {
            debug!("[scheduler] stop signal dropped (ticker already ended)");
        }
        if let Err(e) = ticker.handle.await {
            warn!("[scheduler] ticker exited with error: {}", e);
        }
        info!("[scheduler] stopped");
    }

    /// Run one pass: dispatch a cycle for every active stream that has none
    /// running. Returns the number of dispatched cycles without waiting for
    /// any of them.
    pub async fn tick(&self) -> usize {
        let sessions = self.registry.snapshot().await;
        let now = Utc::now().timestamp();

        let mut cycles = lock(&self.cycles);
        cycles.retain(|handle| !handle.is_finished());

        let mut dispatched = 0;
        for session in sessions {
            let Some(epoch) = session.begin_cycle(now) else {
                debug!(
                    "[scheduler] stream {} previous cycle still running, skipped",
                    session.stream_id()
                );
                continue;
            };
            cycles.push(tokio::spawn(run_cycle(
                self.registry.clone(),
                self.executor.clone(),
                session,
                epoch,
            )));
            dispatched += 1;
        }
        dispatched
    }

    /// Cycles dispatched and not yet reported back.
    pub fn in_flight(&self) -> usize {
        lock(&self.cycles)
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Wait for every dispatched cycle to report back.
    pub async fn wait_idle(&self) {
        loop {
            let cycles = std::mem::take(&mut *lock(&self.cycles));
            if cycles.is_empty() {
                return;
            }
            for handle in cycles {
                if let Err(e) = handle.await {
                    warn!("[scheduler] cycle task failed: {}", e);
                }
            }
        }
    }
}

async fn run_cycle(
    registry: Arc<Registry>,
    executor: Arc<Executor>,
    session: SessionHandle,
    epoch: i64,
) {
    let stream_id = session.stream_id().to_string();
    let source = session.source().to_string();

    // A panicking segmenter must still release the session's cycle slot.
    let outcome = match tokio::spawn(async move {
        executor.run_cycle(&stream_id, &source, epoch).await
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => CycleOutcome::Transient(CycleError::Aborted(e.to_string())),
    };

    registry.complete_cycle(&session, &outcome).await;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
