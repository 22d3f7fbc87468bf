//! A single-flight scheduler for import jobs against a rate limited data source.
//!
//! Import jobs are submitted to an [`ImportScheduler`], which queues them and hands them to a
//! [`engine::FetchEngine`] strictly one at a time, in submission order. The engine reports
//! progress and completion through [`engine::EngineEvent`]s, and clients poll the scheduler for a
//! [`scheduler::snapshot::StatusSnapshot`] of pending, executing and finished jobs.
//!
//! # Example
//!
//! ```
//! # use import_scheduler::prelude::*;
//! # use std::{sync::Arc, time::Duration};
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let (signals, events) = engine::signal_channel();
//! let engine = SimulatedEngine::new(signals).with_fetch_time(Duration::from_millis(1));
//! let scheduler = Arc::new(ImportScheduler::new(engine));
//! let listener = scheduler.spawn_listener(events);
//!
//! scheduler.submit_station_sensor_snapshot().unwrap();
//! scheduler.submit_period_of_record_batch([4, 8]).unwrap();
//!
//! while !scheduler.status_snapshot().unwrap().is_idle() {
//!     tokio::time::sleep(Duration::from_millis(5)).await;
//! }
//! listener.graceful_shutdown().await.unwrap();
//!
//! let snapshot = scheduler.status_snapshot().unwrap();
//! assert_eq!(snapshot.history.len(), 3);
//! # });
//! ```
use thiserror::Error;

pub mod config;
pub mod engine;
pub mod job;
pub mod prelude;
pub mod scheduler;
pub mod sensor;
pub mod testing;

pub use scheduler::ImportScheduler;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid import request: {0}")]
    InvalidRequest(#[from] job::InvalidRequest),
    #[error("Scheduler in bad state")]
    BadState,
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
    #[error("Error encoding or decoding value")]
    EncodeError(#[from] serde_json::Error),
}
