//! The batch scheduler: drives time from "message went quiet" to "pipeline
//! invoked", exactly once per quiet period per session.
//!
//! Readiness depends on elapsed wall-clock time rather than an external
//! trigger, so the scheduler is a fixed-interval polling loop, not
//! event-driven. One user's failure never stops the loop or affects other
//! users.

mod scheduler;
pub mod supervisor;

pub use scheduler::{BatchProcessor, BatchScheduler, SchedulerOptions};
