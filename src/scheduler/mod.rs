//! Interval job scheduler
//!
//! Runs registered [`ScheduledTask`]s every fixed interval, starting
//! immediately. Each job is driven by its own tokio task:
//!
//! ```text
//!   add_job ──▶ JobEntry ──start──▶ driver ──tick──▶ grace check ──▶ run guard ──▶ task.run(args)
//!                  ▲                   │
//!   add_job(same id) replaces ─────────┘ stop
//! ```
//!
//! - Missed ticks are coalesced into one (`MissedTickBehavior::Skip`).
//! - A slot that passed while the previous run was in flight is dropped;
//!   the next run waits for the next slot.
//! - A tick served later than the misfire grace after its latest slot is
//!   dropped.
//! - Runs of one job id never overlap, even across a replacement; a tick
//!   that finds the previous run still going is skipped.
//! - Failures and panics are logged with the job id and never stop other
//!   jobs or the scheduler itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobwatch::scheduler::{JobScheduler, SchedulerConfig};
//!
//! let scheduler = JobScheduler::new(SchedulerConfig::default());
//! scheduler.add_job("hh", Arc::new(polling_task), Duration::from_secs(300), url)?;
//! scheduler.start()?;
//! // ...
//! scheduler.shutdown(true).await;
//! ```

pub mod error;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub use error::{SchedulerError, SchedulerResult};

use crate::utils::signalled;

pub const DEFAULT_MISFIRE_GRACE: Duration = Duration::from_secs(60);

/// Unit of work the scheduler can run periodically
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Arguments handed to every run
    type Args: Clone + Send + Sync + 'static;

    async fn run(&self, args: Self::Args) -> crate::error::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How late a firing may start before it is dropped
    #[serde(with = "crate::config::duration_secs")]
    pub misfire_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            misfire_grace: DEFAULT_MISFIRE_GRACE,
        }
    }
}

type JobAction = Arc<dyn Fn() -> BoxFuture<'static, crate::error::Result<()>> + Send + Sync>;

/// Everything a driver needs to fire one job
#[derive(Clone)]
struct JobRun {
    job_id: String,
    interval: Duration,
    grace: Duration,
    action: JobAction,
    run_guard: Arc<tokio::sync::Mutex<()>>,
}

struct JobEntry {
    run: JobRun,
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct State {
    started: bool,
    shut_down: bool,
    jobs: HashMap<String, JobEntry>,
    /// Drivers of replaced jobs, joined at shutdown
    retired: Vec<JoinHandle<()>>,
    /// Survive replacement so old and new runs exclude each other
    run_guards: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

pub struct JobScheduler {
    config: SchedulerConfig,
    state: Mutex<State>,
    shutdown: watch::Sender<bool>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            state: Mutex::new(State::default()),
            shutdown,
        }
    }

    /// Register `task.run(args)` every `interval`, first run due at once
    ///
    /// Re-adding an existing id replaces the previous registration. When
    /// the scheduler is already running the job starts immediately.
    pub fn add_job<T: ScheduledTask>(
        &self,
        job_id: impl Into<String>,
        task: Arc<T>,
        interval: Duration,
        args: T::Args,
    ) -> SchedulerResult<()> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() {
            return Err(SchedulerError::invalid_job_id(job_id));
        }
        if interval.is_zero() {
            return Err(SchedulerError::invalid_interval(job_id));
        }

        let action: JobAction = Arc::new(move || {
            let task = Arc::clone(&task);
            let args = args.clone();
            async move { task.run(args).await }.boxed()
        });

        let mut state = self.lock();
        if state.shut_down {
            return Err(SchedulerError::ShutDown);
        }

        let run_guard = Arc::clone(state.run_guards.entry(job_id.clone()).or_default());
        let run = JobRun {
            job_id: job_id.clone(),
            interval,
            grace: self.config.misfire_grace,
            action,
            run_guard,
        };
        let (stop, _) = watch::channel(false);
        let mut entry = JobEntry {
            run,
            stop,
            handle: None,
        };

        if state.started {
            entry.handle = Some(self.spawn_driver(&entry));
        }

        if let Some(previous) = state.jobs.insert(job_id.clone(), entry) {
            previous.stop.send_replace(true);
            if let Some(handle) = previous.handle {
                state.retired.retain(|h| !h.is_finished());
                state.retired.push(handle);
            }
            info!(job_id = %job_id, interval_secs = interval.as_secs(), "Replaced job");
        } else {
            info!(job_id = %job_id, interval_secs = interval.as_secs(), "Added job");
        }

        Ok(())
    }

    /// Start driving every registered job
    pub fn start(&self) -> SchedulerResult<()> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        if state.started {
            return Err(SchedulerError::AlreadyStarted);
        }
        state.started = true;

        let handles: Vec<_> = state
            .jobs
            .iter()
            .map(|(id, entry)| (id.clone(), self.spawn_driver(entry)))
            .collect();
        for (id, handle) in handles {
            if let Some(entry) = state.jobs.get_mut(&id) {
                entry.handle = Some(handle);
            }
        }

        info!(jobs = state.jobs.len(), "Scheduler started");
        Ok(())
    }

    /// Stop firing jobs
    ///
    /// With `wait` the in-flight runs are allowed to finish; without it
    /// they are aborted. Later calls are no-ops.
    pub async fn shutdown(&self, wait: bool) {
        let handles = {
            let mut state = self.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            let mut handles = std::mem::take(&mut state.retired);
            handles.extend(state.jobs.values_mut().filter_map(|e| e.handle.take()));
            handles
        };

        info!(wait, drivers = handles.len(), "Scheduler shutting down");
        self.shutdown.send_replace(true);

        for handle in handles {
            if wait {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!("Job driver panicked during shutdown");
                    }
                }
            } else {
                handle.abort();
            }
        }

        info!("Scheduler stopped");
    }

    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_running(&self) -> bool {
        let state = self.lock();
        state.started && !state.shut_down
    }

    /// Drivers of replaced jobs not yet reaped
    pub fn retired_drivers(&self) -> usize {
        self.lock().retired.len()
    }

    fn spawn_driver(&self, entry: &JobEntry) -> JoinHandle<()> {
        tokio::spawn(drive(
            entry.run.clone(),
            entry.stop.subscribe(),
            self.shutdown.subscribe(),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn drive(job: JobRun, mut stop: watch::Receiver<bool>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(job.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_finish: Option<Instant> = None;

    loop {
        let due = tokio::select! {
            biased;
            _ = signalled(&mut stop) => break,
            _ = signalled(&mut shutdown) => break,
            due = ticker.tick() => due,
        };

        match classify(due, Instant::now(), last_finish, job.interval, job.grace) {
            Firing::Run => {}
            Firing::Overrun => {
                debug!(job_id = %job.job_id, "Slot passed during the previous run, waiting for the next");
                continue;
            }
            Firing::Late(lateness) => {
                warn!(
                    job_id = %job.job_id,
                    late_secs = lateness.as_secs(),
                    "Run missed its grace window, skipping"
                );
                continue;
            }
        }

        let Ok(_permit) = Arc::clone(&job.run_guard).try_lock_owned() else {
            warn!(job_id = %job.job_id, "Previous run still in flight, skipping");
            continue;
        };

        debug!(job_id = %job.job_id, "Running job");
        match AssertUnwindSafe((job.action)()).catch_unwind().await {
            Ok(Ok(())) => debug!(job_id = %job.job_id, "Job finished"),
            Ok(Err(e)) => error!(job_id = %job.job_id, error = %e, "Job failed"),
            Err(panic) => error!(
                job_id = %job.job_id,
                panic = %panic_message(panic.as_ref()),
                "Job panicked"
            ),
        }
        last_finish = Some(Instant::now());
    }

    debug!(job_id = %job.job_id, "Job driver stopped");
}

/// What to do with a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Firing {
    Run,
    /// The slot fell while this driver's previous run was still going
    Overrun,
    /// Served too long after the latest slot
    Late(Duration),
}

fn classify(
    due: Instant,
    now: Instant,
    last_finish: Option<Instant>,
    interval: Duration,
    grace: Duration,
) -> Firing {
    if last_finish.is_some_and(|finished| due < finished) {
        return Firing::Overrun;
    }

    // Skipped ticks coalesce into the most recent slot
    let lateness = slot_lateness(now.saturating_duration_since(due), interval);
    if lateness > grace {
        Firing::Late(lateness)
    } else {
        Firing::Run
    }
}

/// Delay past the latest slot, given the delay past the first missed one
fn slot_lateness(late: Duration, interval: Duration) -> Duration {
    let nanos = late.as_nanos() % interval.as_nanos().max(1);
    Duration::from_nanos(nanos as u64)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
