use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use log::{debug, error, info, warn};
use snafu::{ensure, Snafu};
use tokio::{
    runtime::Handle,
    sync::Semaphore,
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::config::models::Poll;

use super::{printer::Printer, registry::PrinterRegistry};

/// Outcome of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Refreshes cut off because the scheduler stopped mid-cycle.
    pub abandoned: usize,
    pub elapsed: Duration,
}

struct CycleRunner {
    registry: Arc<PrinterRegistry>,
    limiter: Arc<Semaphore>,
    stop_grace: Duration,
    cycles: AtomicU64,
    last_report: Mutex<Option<CycleReport>>,
}

impl CycleRunner {
    /// Refreshes every printer registered when the cycle starts, each in its
    /// own task. Once `token` is cancelled the remaining refreshes get
    /// `stop_grace` to finish before they are aborted.
    async fn run_cycle(&self, token: &CancellationToken) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let printers = self.registry.printers();
        let mut report = CycleReport {
            cycle,
            attempted: printers.len(),
            ..Default::default()
        };
        debug!("Cycle {} refreshing {} printers", cycle, printers.len());

        let mut tasks = JoinSet::new();
        for printer in printers {
            let limiter = self.limiter.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so this only waits.
                let _permit = limiter.acquire_owned().await.ok();
                printer.refresh().await
            });
        }

        let cancelled = tokio::select! {
            _ = drain(&mut tasks, &mut report) => false,
            _ = token.cancelled() => true,
        };
        if cancelled && !tasks.is_empty() {
            if tokio::time::timeout(self.stop_grace, drain(&mut tasks, &mut report)).await.is_err() {
                report.abandoned = tasks.len();
                warn!("Cycle {} abandoning {} refreshes after {:?} grace", cycle, report.abandoned, self.stop_grace);
                tasks.abort_all();
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "Cycle {} done in {:?}: {} ok, {} failed, {} abandoned",
            cycle, report.elapsed, report.succeeded, report.failed, report.abandoned
        );
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }
}

async fn drain(tasks: &mut JoinSet<bool>, report: &mut CycleReport) {
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(true) => report.succeeded += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                error!("Refresh task died: {}", e);
                report.failed += 1;
            }
        }
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic poller over a [`PrinterRegistry`].
///
/// Cycles never overlap: a tick that comes due while a cycle is still running
/// is skipped and the next cycle starts on the following tick.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    running: Mutex<Option<Running>>,
    // Refreshes started outside a cycle, reined in by `stop`.
    detached: Mutex<JoinSet<bool>>,
}

impl Scheduler {
    pub fn new(registry: Arc<PrinterRegistry>, settings: &Poll) -> Self {
        Scheduler {
            runner: Arc::new(CycleRunner {
                registry,
                limiter: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
                stop_grace: settings.stop_grace,
                cycles: AtomicU64::new(0),
                last_report: Mutex::new(None),
            }),
            running: Mutex::new(None),
            detached: Mutex::new(JoinSet::new()),
        }
    }

    /// Starts polling every `interval`, beginning immediately, on the Tokio
    /// runtime of the caller.
    pub fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        ensure!(!interval.is_zero(), ZeroIntervalSnafu);
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        ensure!(
            !running.as_ref().is_some_and(|r| !r.handle.is_finished()),
            AlreadyRunningSnafu
        );

        let token = CancellationToken::new();
        let handle = runtime.spawn(poll_loop(self.runner.clone(), interval, token.clone()));
        *running = Some(Running { token, handle });
        info!("Scheduler started, polling every {}", humantime::format_duration(interval));
        Ok(())
    }

    /// Stops polling and waits for the loop to exit. An in-flight cycle gets
    /// the configured grace period before its refreshes are abandoned.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Running { token, handle }) = running {
            token.cancel();
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }

        let mut detached = std::mem::take(&mut *self.detached.lock().unwrap_or_else(PoisonError::into_inner));
        if detached.is_empty() {
            return;
        }
        let drained = tokio::time::timeout(self.runner.stop_grace, async {
            while detached.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Abandoning {} out-of-cycle refreshes after {:?} grace", detached.len(), self.runner.stop_grace);
            detached.abort_all();
        }
    }

    /// Refreshes `printer` in the background, outside any cycle. `stop` gives
    /// it the same grace as an in-flight cycle. Returns `false` without a
    /// Tokio runtime.
    pub(crate) fn spawn_refresh(&self, printer: Arc<Printer>) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };
        let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
        while detached.try_join_next().is_some() {}
        detached.spawn_on(async move { printer.refresh().await }, &runtime);
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Runs one cycle right now, outside the timer.
    pub async fn run_cycle(&self) -> CycleReport {
        self.runner.run_cycle(&CancellationToken::new()).await
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.runner.last_report.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

async fn poll_loop(runner: Arc<CycleRunner>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let report = runner.run_cycle(&token).await;
        if report.elapsed > interval {
            debug!("Cycle {} outlasted the polling interval, skipping missed ticks", report.cycle);
        }
        if token.is_cancelled() {
            break;
        }
    }

    info!("Scheduler stopped");
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum SchedulerError {
    #[snafu(display("Scheduler is already running"))]
    AlreadyRunning,

    #[snafu(display("Polling interval must be greater than zero"))]
    ZeroInterval,

    #[snafu(display("Scheduler must be started from within a Tokio runtime"))]
    NoRuntime,
}
