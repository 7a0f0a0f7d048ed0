//! # Sync Scheduler
//!
//! Drives registered cycles on their configured cadences.
//!
//! ## Cycle Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncScheduler                                    │
//! │                                                                         │
//! │  register("reading-collection", every 60s,        collect_fn)          │
//! │  register("reading-upload",     cron 0 */5 ...,   upload_fn)           │
//! │  register("config-sync",        cron 0 */30 ...,  config_fn)           │
//! │  register("sync-tick",          every 30s,        sync_fn)             │
//! │                                                                         │
//! │  INTERVAL DRIVER                    CRON DRIVER                        │
//! │  ───────────────                    ───────────                        │
//! │  tick ──► run body inline           wait for next UTC firing           │
//! │  (next tick delayed while           ├─ body idle: spawn it             │
//! │   the body runs, so runs            └─ body still running: skip the    │
//! │   never overlap)                       tick, count it, log it          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cycle body that returns an error is logged and the cycle keeps its
//! schedule; one bad run never kills a cycle.

use chrono::Utc;
use cron::Schedule;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Cadence;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Cycle Types
// =============================================================================

/// Future returned by one cycle run.
pub type CycleFuture = Pin<Box<dyn Future<Output = SyncResult<()>> + Send>>;

/// Factory invoked once per firing of a cycle.
pub type CycleFn = Arc<dyn Fn() -> CycleFuture + Send + Sync>;

/// Reportable view of one registered cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleInfo {
    /// Cycle name.
    pub name: String,

    /// Configured cadence.
    pub cadence: Cadence,

    /// Cron ticks skipped because the previous run was still going.
    pub skipped_ticks: u64,
}

/// Parsed cadence, resolved at registration so a bad expression fails fast.
#[derive(Clone)]
enum CadenceRuntime {
    Interval(Duration),
    Cron(Schedule),
}

fn parse_cadence(cadence: &Cadence) -> SyncResult<CadenceRuntime> {
    match cadence {
        Cadence::IntervalSecs(0) => Err(SyncError::InvalidCadence(
            "interval must be greater than 0 seconds".into(),
        )),
        Cadence::IntervalSecs(secs) => Ok(CadenceRuntime::Interval(Duration::from_secs(*secs))),
        Cadence::Cron(expr) => Schedule::from_str(expr)
            .map(CadenceRuntime::Cron)
            .map_err(|e| SyncError::InvalidCadence(format!("'{expr}': {e}"))),
    }
}

// =============================================================================
// Cycle Guard
// =============================================================================

/// Tracks whether a cycle body is running and how many cron ticks it has
/// swallowed.
struct CycleGuard {
    running: AtomicBool,
    skipped: AtomicU64,
}

impl CycleGuard {
    fn new() -> Arc<Self> {
        Arc::new(CycleGuard {
            running: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
        })
    }

    /// Claims the running flag for one body execution.
    fn try_begin(self: &Arc<Self>) -> Option<CycleRun> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleRun {
                guard: self.clone(),
            })
    }

    fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }
}

/// Releases the running flag when the body finishes, however it finishes.
struct CycleRun {
    guard: Arc<CycleGuard>,
}

impl Drop for CycleRun {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Scheduler
// =============================================================================

struct RegisteredCycle {
    name: String,
    cadence: Cadence,
    runtime: CadenceRuntime,
    run_fn: CycleFn,
    guard: Arc<CycleGuard>,
}

/// Owns the cycle registry and the driver tasks.
pub struct SyncScheduler {
    /// Registered cycles, in registration order.
    cycles: Mutex<Vec<RegisteredCycle>>,

    /// Driver task handles (set after start).
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Broadcast shutdown flag for the drivers.
    shutdown_tx: watch::Sender<bool>,
}

impl SyncScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        SyncScheduler {
            cycles: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Registers a cycle. Call before `start`; the cadence is parsed here
    /// so an invalid one is rejected up front.
    pub async fn register(
        &self,
        name: impl Into<String>,
        cadence: Cadence,
        run_fn: CycleFn,
    ) -> SyncResult<()> {
        let name = name.into();
        let runtime = parse_cadence(&cadence)?;

        info!(cycle = %name, cadence = %cadence, "Cycle registered");

        self.cycles.lock().await.push(RegisteredCycle {
            name,
            cadence,
            runtime,
            run_fn,
            guard: CycleGuard::new(),
        });

        Ok(())
    }

    /// Spawns one driver task per registered cycle.
    pub async fn start(&self) {
        let cycles = self.cycles.lock().await;
        let mut tasks = self.tasks.lock().await;

        for cycle in cycles.iter() {
            let name = cycle.name.clone();
            let run_fn = cycle.run_fn.clone();
            let guard = cycle.guard.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();

            let handle = match cycle.runtime.clone() {
                CadenceRuntime::Interval(period) => {
                    tokio::spawn(run_interval_driver(name, period, run_fn, shutdown_rx))
                }
                CadenceRuntime::Cron(schedule) => tokio::spawn(run_cron_driver(
                    name,
                    schedule,
                    run_fn,
                    guard,
                    shutdown_rx,
                )),
            };
            tasks.push(handle);
        }

        info!(cycles = cycles.len(), "Scheduler started");
    }

    /// Stops all drivers and waits for them to exit. Cron bodies already
    /// spawned are left to finish on their own.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }

        info!("Scheduler stopped");
    }

    /// Snapshot of the registered cycles for status reporting.
    pub async fn schedule_config(&self) -> Vec<CycleInfo> {
        self.cycles
            .lock()
            .await
            .iter()
            .map(|c| CycleInfo {
                name: c.name.clone(),
                cadence: c.cadence.clone(),
                skipped_ticks: c.guard.skipped(),
            })
            .collect()
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Drivers
// =============================================================================

/// Fixed-interval driver. The body runs inline, so the next tick is pushed
/// out while it runs and runs never overlap themselves.
async fn run_interval_driver(
    name: String,
    period: Duration,
    run_fn: CycleFn,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_fn().await {
                    error!(cycle = %name, error = %e, "Cycle run failed");
                }
            }
            _ = shutdown_rx.changed() => {
                info!(cycle = %name, "Cycle driver stopped");
                break;
            }
        }
    }
}

/// Cron driver, aligned to UTC wall-clock firings. Bodies run detached so a
/// slow one cannot push later firings off schedule; a firing that lands
/// while the previous body still runs is skipped and counted.
async fn run_cron_driver(
    name: String,
    schedule: Schedule,
    run_fn: CycleFn,
    guard: Arc<CycleGuard>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let next = match schedule.after(&Utc::now()).next() {
            Some(next) => next,
            None => {
                warn!(cycle = %name, "Cron schedule has no future firings");
                break;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match guard.try_begin() {
                    Some(run) => {
                        let name = name.clone();
                        let body = run_fn();
                        tokio::spawn(async move {
                            let _run = run;
                            if let Err(e) = body.await {
                                error!(cycle = %name, error = %e, "Cycle run failed");
                            }
                        });
                    }
                    None => {
                        guard.record_skip();
                        warn!(cycle = %name, "Previous run still in progress, skipping tick");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!(cycle = %name, "Cycle driver stopped");
                break;
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    fn counting_cycle(counter: Arc<AtomicU64>) -> CycleFn {
        Arc::new(move || -> CycleFuture {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_cycle(counter: Arc<AtomicU64>) -> CycleFn {
        Arc::new(move || -> CycleFuture {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::RemoteUnreachable("scripted".into()))
            })
        })
    }

    async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn test_invalid_cadence_rejected_at_registration() {
        let scheduler = SyncScheduler::new();
        let counter = Arc::new(AtomicU64::new(0));

        let err = scheduler
            .register(
                "bad-cron",
                Cadence::Cron("every tuesday".into()),
                counting_cycle(counter.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidCadence(_)));

        let err = scheduler
            .register(
                "zero-interval",
                Cadence::IntervalSecs(0),
                counting_cycle(counter),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidCadence(_)));

        assert!(scheduler.schedule_config().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_cycle_runs_repeatedly() {
        let scheduler = SyncScheduler::new();
        let counter = Arc::new(AtomicU64::new(0));

        scheduler
            .register(
                "collection",
                Cadence::IntervalSecs(30),
                counting_cycle(counter.clone()),
            )
            .await
            .unwrap();
        scheduler.start().await;

        // First tick fires immediately, then t=30, 60, 90.
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_run_independently() {
        let scheduler = SyncScheduler::new();
        let fast = Arc::new(AtomicU64::new(0));
        let slow = Arc::new(AtomicU64::new(0));

        scheduler
            .register("fast", Cadence::IntervalSecs(10), counting_cycle(fast.clone()))
            .await
            .unwrap();
        scheduler
            .register("slow", Cadence::IntervalSecs(25), counting_cycle(slow.clone()))
            .await
            .unwrap();
        scheduler.start().await;

        tokio::time::sleep(Duration::from_secs(51)).await;
        // fast: t=0,10,20,30,40,50; slow: t=0,25,50
        assert_eq!(fast.load(Ordering::SeqCst), 6);
        assert_eq!(slow.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_body_keeps_its_schedule() {
        let scheduler = SyncScheduler::new();
        let counter = Arc::new(AtomicU64::new(0));

        scheduler
            .register(
                "flaky",
                Cadence::IntervalSecs(10),
                failing_cycle(counter.clone()),
            )
            .await
            .unwrap();
        scheduler.start().await;

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_the_cycles() {
        let scheduler = SyncScheduler::new();
        let counter = Arc::new(AtomicU64::new(0));

        scheduler
            .register(
                "collection",
                Cadence::IntervalSecs(10),
                counting_cycle(counter.clone()),
            )
            .await
            .unwrap();
        scheduler.start().await;

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    // Cron alignment comes from the wall clock, so this test runs in real
    // time on an every-second expression and stays loose on exact counts.
    #[tokio::test]
    async fn test_cron_tick_skipped_while_previous_run_active() {
        let scheduler = SyncScheduler::new();
        let runs = Arc::new(AtomicU64::new(0));
        let gate = Arc::new(Notify::new());

        let cycle: CycleFn = {
            let runs = runs.clone();
            let gate = gate.clone();
            Arc::new(move || -> CycleFuture {
                let runs = runs.clone();
                let gate = gate.clone();
                Box::pin(async move {
                    // First run blocks until released; later runs are quick.
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        gate.notified().await;
                    }
                    Ok(())
                })
            })
        };

        scheduler
            .register("upload", Cadence::Cron("* * * * * *".into()), cycle)
            .await
            .unwrap();
        scheduler.start().await;

        wait_for("first cron run", || runs.load(Ordering::SeqCst) >= 1).await;

        // The next firing lands while the first body is still blocked on
        // the gate; the driver must skip it, not start a second body.
        let mut skipped = 0;
        for _ in 0..400 {
            skipped = scheduler.schedule_config().await[0].skipped_ticks;
            if skipped >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(skipped >= 1, "no tick was skipped");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Release the body; the cycle resumes on later firings.
        gate.notify_one();
        wait_for("post-release run", || runs.load(Ordering::SeqCst) >= 2).await;

        scheduler.stop().await;
    }
}
