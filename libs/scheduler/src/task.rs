//! Cancellable periodic task runner
//!
//! Each component registers one `PeriodicTask`; the runner drives it from
//! its own tokio interval. A tick that runs longer than the period makes
//! the missed ticks get skipped rather than queued, and the task can ask
//! for a different period after every tick.

use crate::clock::SharedClock;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Period for task {task} must be non-zero")]
    ZeroPeriod { task: String },

    #[error("Task {task} panicked or was aborted")]
    Join { task: String },
}

/// What a tick wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep the current period
    Continue,
    /// Switch to a new period starting now
    Reschedule(Duration),
    /// Stop this task
    Stop,
}

/// Periodic unit of work
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &str;

    /// Run one tick at wall time `now` (Unix nanos)
    fn tick(&mut self, now: i64) -> TickOutcome;
}

/// Counters reported when a task ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub ticks: u64,
    /// Ticks whose work took longer than the period
    pub overruns: u64,
    pub reschedules: u64,
    pub final_period: Duration,
}

fn make_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Drive `task` until shutdown is signalled or the task stops itself
pub async fn run_task<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    clock: SharedClock,
    mut shutdown: watch::Receiver<bool>,
) -> TaskStats {
    let mut stats = TaskStats {
        final_period: period,
        ..TaskStats::default()
    };
    let mut interval = make_interval(period);
    info!(task = task.name(), period_ms = period.as_millis() as u64, "periodic task started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let started = Instant::now();
                let outcome = task.tick(clock.now_nanos());
                stats.ticks += 1;

                let elapsed = started.elapsed();
                if elapsed > stats.final_period {
                    stats.overruns += 1;
                    warn!(
                        task = task.name(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        period_ms = stats.final_period.as_millis() as u64,
                        "tick overran its period, skipping missed ticks"
                    );
                }

                match outcome {
                    TickOutcome::Continue => {}
                    TickOutcome::Reschedule(next) if next.is_zero() => {
                        warn!(task = task.name(), "ignoring zero period request");
                    }
                    TickOutcome::Reschedule(next) => {
                        if next != stats.final_period {
                            debug!(
                                task = task.name(),
                                from_ms = stats.final_period.as_millis() as u64,
                                to_ms = next.as_millis() as u64,
                                "rescheduling"
                            );
                            stats.final_period = next;
                            stats.reschedules += 1;
                            interval = make_interval(next);
                        }
                    }
                    TickOutcome::Stop => break,
                }
            }
        }
    }

    info!(task = task.name(), ticks = stats.ticks, overruns = stats.overruns, "periodic task stopped");
    stats
}

/// Owns the running tasks and their shared shutdown signal
pub struct Scheduler {
    clock: SharedClock,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<TaskStats>)>,
}

impl Scheduler {
    pub fn new(clock: SharedClock) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            clock,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Spawn `task` on the current runtime with the given initial period
    pub fn spawn<T: PeriodicTask>(&mut self, task: T, period: Duration) -> Result<(), SchedulerError> {
        let name = task.name().to_string();
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod { task: name });
        }
        let handle = tokio::spawn(run_task(
            task,
            period,
            self.clock.clone(),
            self.shutdown_tx.subscribe(),
        ));
        self.tasks.push((name, handle));
        Ok(())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(self) -> Result<Vec<(String, TaskStats)>, SchedulerError> {
        let _ = self.shutdown_tx.send(true);
        let mut results = Vec::with_capacity(self.tasks.len());
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(stats) => results.push((name, stats)),
                Err(_) => return Err(SchedulerError::Join { task: name }),
            }
        }
        Ok(results)
    }
}
