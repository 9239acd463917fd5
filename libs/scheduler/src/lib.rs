//! Scheduling primitives
//!
//! - `clock`: injectable wall clock (`SystemClock`, `ManualClock`)
//! - `task`: cancellable periodic tasks with adaptive periods and
//!   skip-on-overrun back-pressure

pub mod clock;
pub mod task;

pub use clock::{duration_nanos, Clock, ManualClock, SharedClock, SystemClock};
pub use task::{run_task, PeriodicTask, Scheduler, SchedulerError, TaskStats, TickOutcome};
