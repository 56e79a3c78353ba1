//! Job Scheduler (spec §4.1): the orchestrator tying together the queue,
//! per-job state, checkpoints, and the playlist/fetch/pipeline/mux/retention
//! subsystems.

pub mod checkpoint;
mod job;
mod queue;
mod scheduler;
mod state_machine;

pub use checkpoint::Checkpoint;
pub use job::{Job, JobDescriptor, SubtitleDescriptor};
pub use queue::Queue;
pub use scheduler::{
    CancelByItemsResult, JobScheduler, QueueInfo, SchedulerConfig, StartJobRequest,
};
pub use state_machine::status_label;
