//! The contract of the fetch engine that performs the actual remote imports.
//!
//! The scheduler never talks to the remote data source itself. Instead it hands each job to a
//! [`FetchEngine`], one job at a time, and learns about progress and completion through the
//! [`EngineEvent`]s the engine sends over its [`Signals`].
//!
//! A fetch engine:
//!
//! - runs at most one logical run at a time, reporting [`FetchEngine::is_busy`] while it does,
//! - either rejects a run synchronously or returns immediately and continues in the background,
//! - retries transient connection failures internally up to
//!   [`EngineConfig::max_connection_retries`],
//! - signals [`EngineEvent::ProgressChanged`] while running and exactly one
//!   [`EngineEvent::RunFinished`] per accepted run, carrying the [`JobId`] it was started with.
//!
//! [`simulated::SimulatedEngine`] is an in-process implementation of this contract.
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    job::{range::DateRange, JobId, SensorId},
    sensor::SensorType,
};

pub mod backoff;
pub mod simulated;

/// Settings handed to the engine when the scheduler is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// The maximum number of concurrent fetches within a single run.
    pub max_concurrency: usize,
    /// The maximum number of connection attempts per fetch before it is considered failed.
    pub max_connection_retries: u16,
}

impl EngineConfig {
    pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
    pub const DEFAULT_MAX_CONNECTION_RETRIES: u16 = 5;

    pub const fn new() -> Self {
        Self {
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            max_connection_retries: Self::DEFAULT_MAX_CONNECTION_RETRIES,
        }
    }

    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub const fn with_max_connection_retries(mut self, max_connection_retries: u16) -> Self {
        self.max_connection_retries = max_connection_retries;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A synchronous rejection of a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Cannot launch request because the fetch engine is busy")]
    Busy,
    #[error("The fetch engine requires a running async runtime")]
    NoRuntime,
    #[error("{0}")]
    Rejected(String),
}

/// How an accepted run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed { message: String },
}

impl RunOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine's busy flag or progress fraction changed.
    ProgressChanged,
    /// The run started for `job_id` has finished.
    RunFinished { job_id: JobId, outcome: RunOutcome },
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// The sending half of the engine's event channel.
#[derive(Debug, Clone)]
pub struct Signals(mpsc::UnboundedSender<EngineEvent>);

impl Signals {
    pub fn progress_changed(&self) {
        self.send(EngineEvent::ProgressChanged)
    }

    pub fn run_finished(&self, job_id: JobId, outcome: RunOutcome) {
        self.send(EngineEvent::RunFinished { job_id, outcome })
    }

    fn send(&self, event: EngineEvent) {
        if let Err(err) = self.0.send(event) {
            tracing::error!(?err, "Failed to send fetch engine event, no scheduler listening")
        }
    }
}

/// Create the channel an engine uses to signal the scheduler.
pub fn signal_channel() -> (Signals, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Signals(sender), receiver)
}

/// The single-flight engine performing remote imports.
///
/// None of the methods may block: the scheduler calls them while holding its state lock.
#[cfg_attr(test, mockall::automock)]
pub trait FetchEngine: Send + Sync {
    /// Apply the scheduler's engine settings.
    fn configure(&self, _config: EngineConfig) {}

    /// Whether a run is in progress or queued inside the engine.
    fn is_busy(&self) -> bool;

    /// The fraction of the current run completed, in `0.0..=1.0`.
    fn progress(&self) -> Option<f64>;

    /// The error of the most recent run, if it failed.
    fn last_error(&self) -> Option<String>;

    fn import_time_series(
        &self,
        job_id: JobId,
        range: &DateRange,
        sensors: &[SensorType],
    ) -> Result<(), EngineError>;

    fn import_station_sensors(&self, job_id: JobId) -> Result<(), EngineError>;

    fn import_period_of_record(&self, job_id: JobId, sensor_id: SensorId)
        -> Result<(), EngineError>;

    /// Request cooperative cancellation of the current run.
    ///
    /// The run still ends with a [`EngineEvent::RunFinished`] signal.
    fn stop(&self);
}

impl<T> FetchEngine for Arc<T>
where
    T: FetchEngine + ?Sized,
{
    fn configure(&self, config: EngineConfig) {
        (**self).configure(config)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn progress(&self) -> Option<f64> {
        (**self).progress()
    }

    fn last_error(&self) -> Option<String> {
        (**self).last_error()
    }

    fn import_time_series(
        &self,
        job_id: JobId,
        range: &DateRange,
        sensors: &[SensorType],
    ) -> Result<(), EngineError> {
        (**self).import_time_series(job_id, range, sensors)
    }

    fn import_station_sensors(&self, job_id: JobId) -> Result<(), EngineError> {
        (**self).import_station_sensors(job_id)
    }

    fn import_period_of_record(
        &self,
        job_id: JobId,
        sensor_id: SensorId,
    ) -> Result<(), EngineError> {
        (**self).import_period_of_record(job_id, sensor_id)
    }

    fn stop(&self) {
        (**self).stop()
    }
}
