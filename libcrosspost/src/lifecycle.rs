//! Start/stop control for the scheduler loop

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::db::PostStore;
use crate::dispatch::Dispatcher;
use crate::error::{CrosspostError, Result};
use crate::retry::RetryPolicy;
use crate::scheduler::{Scheduler, TickReport};

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns one scheduler loop
///
/// The loop runs on a single task: the first tick fires as soon as the
/// processor starts, later ticks follow the poll interval and never overlap.
/// Ticks missed while a slow tick was running are skipped, not replayed.
pub struct ScheduledPostProcessor {
    scheduler: Scheduler,
    poll_interval: Duration,
    running: Option<RunningLoop>,
}

impl ScheduledPostProcessor {
    pub fn new(store: Arc<dyn PostStore>, dispatcher: Arc<Dispatcher>, config: &SchedulerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(store, dispatcher, config),
            poll_interval: config.poll_interval(),
            running: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.scheduler = self.scheduler.clone().with_policy(policy);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawn the polling loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CrosspostError::Lifecycle(
                "scheduled post processor is already running".to_string(),
            ));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = self.scheduler.clone();
        let poll_interval = self.poll_interval;

        info!(poll_interval_secs = poll_interval.as_secs(), "Starting scheduled post processor");
        let handle = tokio::spawn(run_loop(scheduler, poll_interval, shutdown_rx));

        self.running = Some(RunningLoop { shutdown, handle });
        Ok(())
    }

    /// Signal the loop to exit and wait for the in-flight tick to finish
    ///
    /// Stopping a processor that is not running does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // Err only means the loop already exited
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            error!(error = %e, "Scheduler loop terminated abnormally");
        }
        info!("Scheduled post processor stopped");
    }

    /// Run a single tick at the current time, outside the loop
    ///
    /// Rejected while the loop is running, since both ticks could pick up
    /// the same due post.
    pub async fn run_once(&self) -> Result<TickReport> {
        if self.is_running() {
            return Err(CrosspostError::Lifecycle(
                "cannot run a single tick while the processor is running".to_string(),
            ));
        }
        Ok(self.scheduler.tick(unix_now()).await)
    }
}

impl Drop for ScheduledPostProcessor {
    fn drop(&mut self) {
        // Let a detached loop finish its current tick and exit
        if let Some(running) = &self.running {
            let _ = running.shutdown.send(true);
        }
    }
}

async fn run_loop(scheduler: Scheduler, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                scheduler.tick(unix_now()).await;
                if *shutdown.borrow() {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
