pub mod job_runner;
pub mod job_worker;
pub mod pool;

pub use job_runner::{EncodeJob, JobRunner};
pub use pool::{JobQueue, QueueFull, QueueSlot, WorkerPool};
