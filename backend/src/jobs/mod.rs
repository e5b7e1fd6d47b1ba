// Background Jobs
//
// Cron-driven firing of schedule_based workflow triggers.

pub mod scheduler;

pub use scheduler::{JobError, JobResult, ScheduleRun, ScheduleRunLog, WorkflowScheduler};
