//! Wall-clock anchored cycle scheduler.
//!
//! Ticks fall on multiples of the cadence since the Unix epoch. A tick that
//! arrives while the previous cycle is still running is skipped, not queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as CycleLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use wattvakt_config::{SchedulerConfig, SummaryConfig};
use wattvakt_core::time::next_boundary;
use wattvakt_telemetry::EventLogger;

use crate::runtime::CycleRunner;
use crate::summary;
use crate::EngineError;

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    runner: Arc<CycleRunner>,
    cadence: Duration,
    stop_timeout: Duration,
    run_on_start: bool,
    summary: Option<SummaryConfig>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(runner: Arc<CycleRunner>, config: &SchedulerConfig) -> Self {
        Self {
            runner,
            cadence: config.cadence(),
            stop_timeout: config.stop_timeout(),
            run_on_start: config.run_on_start,
            summary: config.summary.clone(),
            running: Mutex::new(None),
        }
    }

    pub fn runner(&self) -> &Arc<CycleRunner> {
        &self.runner
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Starts the tick loop. Calling it again while running does nothing.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Scheduler already running");
            return Ok(());
        }
        if self.cadence.is_zero() {
            return Err(wattvakt_core::CoreError::ZeroCadence.into());
        }

        self.runner.gate().open();
        let (shutdown, rx) = watch::channel(false);
        let tick_loop = TickLoop {
            runner: self.runner.clone(),
            cadence: self.cadence,
            stop_timeout: self.stop_timeout,
            run_on_start: self.run_on_start,
            summary: self.summary.clone(),
        };
        let handle = tokio::spawn(tick_loop.run(rx));
        *running = Some(Running { shutdown, handle });
        info!(cadence_secs = self.cadence.as_secs(), "Scheduler started");
        Ok(())
    }

    /// Stops ticking and waits, at most the stop timeout, for the cycle in
    /// flight. No snapshot is committed once this returns.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };
        info!("Stopping scheduler");

        self.runner.gate().close();
        let _ = running.shutdown.send(true);
        let result = running.handle.await;

        info!("Scheduler stopped");
        result.map_err(EngineError::from)
    }
}

struct TickLoop {
    runner: Arc<CycleRunner>,
    cadence: Duration,
    stop_timeout: Duration,
    run_on_start: bool,
    summary: Option<SummaryConfig>,
}

impl TickLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let busy = Arc::new(CycleLock::new(()));
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut summary_task: Option<JoinHandle<bool>> = None;
        // Wall clocks can read slightly behind the timer that woke us; never
        // schedule the same boundary twice.
        let mut last_tick: Option<DateTime<Utc>> = None;
        let mut last_summary: Option<DateTime<Utc>> = None;

        if self.run_on_start {
            self.trigger(&busy, &mut in_flight).await;
        }

        loop {
            let now = self.runner.clock().now();
            let next_tick = match next_boundary(last_tick.map_or(now, |t| t.max(now)), self.cadence) {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "Cannot compute next tick; scheduler exiting");
                    break;
                }
            };
            let next_summary = self
                .summary
                .as_ref()
                .and_then(|config| summary::next_run(last_summary.map_or(now, |t| t.max(now)), config));

            tokio::select! {
                _ = tokio::time::sleep(until(now, next_tick)) => {
                    last_tick = Some(next_tick);
                    self.trigger(&busy, &mut in_flight).await;
                }
                _ = sleep_until_opt(now, next_summary) => {
                    last_summary = next_summary;
                    let runner = self.runner.clone();
                    summary_task = Some(tokio::spawn(async move { runner.send_summary().await }));
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Some(handle) = summary_task.take() {
            if !handle.is_finished() {
                debug!("Cancelling daily summary still being sent");
            }
            handle.abort();
        }

        if let Some(mut handle) = in_flight.take() {
            match tokio::time::timeout(self.stop_timeout, &mut handle).await {
                Ok(_) => debug!("In-flight cycle finished"),
                Err(_) => {
                    warn!(
                        timeout_secs = self.stop_timeout.as_secs(),
                        "In-flight cycle did not finish in time; abandoning it"
                    );
                    handle.abort();
                }
            }
        }
    }

    async fn trigger(&self, busy: &Arc<CycleLock<()>>, in_flight: &mut Option<JoinHandle<()>>) {
        match busy.clone().try_lock_owned() {
            Ok(guard) => {
                let runner = self.runner.clone();
                *in_flight = Some(tokio::spawn(async move {
                    let _guard = guard;
                    runner.run_cycle().await;
                }));
            }
            Err(_) => {
                warn!("Previous cycle still running; tick skipped");
                self.runner.metrics().cycles_skipped.inc();
                EventLogger::log_event(
                    "cycle_skipped",
                    vec![KeyValue::new("cadence_secs", self.cadence.as_secs() as i64)],
                )
                .await;
            }
        }
    }
}

fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or_default()
}

async fn sleep_until_opt(now: DateTime<Utc>, at: Option<DateTime<Utc>>) {
    match at {
        Some(at) => tokio::time::sleep(until(now, at)).await,
        None => std::future::pending().await,
    }
}
