pub mod connection;
pub mod job_repository;
pub mod migrations;
pub mod models;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use job_repository::JobRepository;
pub use models::{DeliveryRecord, JobStatus, NewVideo, VideoRow};
pub use store::{JobStore, StoreError};
