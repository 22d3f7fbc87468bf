//! Helpers for testing code that drives an [`ImportScheduler`](crate::scheduler::ImportScheduler).
//!
//! [`ManualEngine`] is a [`FetchEngine`] that does nothing on its own: it records the runs it is
//! asked to start and stays busy until the test says otherwise. Signals are injected by calling
//! the scheduler's handlers directly.
//!
//! # Example
//!
//! ```
//! # use import_scheduler::prelude::*;
//! # use import_scheduler::testing::ManualEngine;
//! # use std::sync::Arc;
//! let engine = Arc::new(ManualEngine::new());
//! let scheduler = ImportScheduler::new(engine.clone());
//!
//! let job_id = scheduler.submit_station_sensor_snapshot().unwrap();
//! assert_eq!(engine.started_jobs(), vec![job_id]);
//!
//! engine.finish();
//! scheduler.on_run_finished(job_id, RunOutcome::Succeeded).unwrap();
//!
//! let snapshot = scheduler.status_snapshot().unwrap();
//! assert_eq!(snapshot.history[0].status(), JobStatus::Completed);
//! ```
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    engine::{EngineConfig, EngineError, FetchEngine},
    job::{range::DateRange, JobId, SensorId},
    sensor::SensorType,
};

/// A run a [`ManualEngine`] was asked to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    TimeSeries {
        job_id: JobId,
        range: DateRange,
        sensors: Vec<SensorType>,
    },
    StationSensors {
        job_id: JobId,
    },
    PeriodOfRecord {
        job_id: JobId,
        sensor_id: SensorId,
    },
}

impl EngineCall {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::TimeSeries { job_id, .. }
            | Self::StationSensors { job_id }
            | Self::PeriodOfRecord { job_id, .. } => *job_id,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    configured: Option<EngineConfig>,
    busy: bool,
    idle_on_accept: bool,
    progress: Option<f64>,
    last_error: Option<String>,
    rejections: VecDeque<EngineError>,
    calls: Vec<EngineCall>,
    stops: usize,
}

/// A [`FetchEngine`] controlled entirely by the test.
#[derive(Debug, Default)]
pub struct ManualEngine {
    state: Mutex<State>,
}

impl ManualEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report idle straight after accepting a run instead of busy.
    pub fn idle_on_accept(self) -> Self {
        self.state().idle_on_accept = true;
        self
    }

    pub fn set_busy(&self, busy: bool) {
        self.state().busy = busy;
    }

    pub fn set_progress(&self, progress: Option<f64>) {
        self.state().progress = progress;
    }

    pub fn set_last_error(&self, error: Option<&str>) {
        self.state().last_error = error.map(ToOwned::to_owned);
    }

    /// Reject the next run synchronously with `error`.
    pub fn reject_next(&self, error: EngineError) {
        self.state().rejections.push_back(error);
    }

    /// Mark the current run as done, leaving the engine idle.
    ///
    /// The scheduler still has to be told through one of its signal handlers.
    pub fn finish(&self) {
        let mut state = self.state();
        state.busy = false;
        state.progress = Some(1.0);
    }

    /// Every run the engine was asked to start, including rejected ones.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn started_jobs(&self) -> Vec<JobId> {
        self.state().calls.iter().map(EngineCall::job_id).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.state().stops
    }

    pub fn configured(&self) -> Option<EngineConfig> {
        self.state().configured
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept(&self, call: EngineCall) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(error) = state.rejections.pop_front() {
            return Err(error);
        }
        if state.busy {
            return Err(EngineError::Busy);
        }
        state.busy = !state.idle_on_accept;
        state.progress = Some(0.0);
        state.last_error = None;
        Ok(())
    }
}

impl FetchEngine for ManualEngine {
    fn configure(&self, config: EngineConfig) {
        self.state().configured = Some(config);
    }

    fn is_busy(&self) -> bool {
        self.state().busy
    }

    fn progress(&self) -> Option<f64> {
        self.state().progress
    }

    fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    fn import_time_series(
        &self,
        job_id: JobId,
        range: &DateRange,
        sensors: &[SensorType],
    ) -> Result<(), EngineError> {
        self.accept(EngineCall::TimeSeries {
            job_id,
            range: *range,
            sensors: sensors.to_vec(),
        })
    }

    fn import_station_sensors(&self, job_id: JobId) -> Result<(), EngineError> {
        self.accept(EngineCall::StationSensors { job_id })
    }

    fn import_period_of_record(
        &self,
        job_id: JobId,
        sensor_id: SensorId,
    ) -> Result<(), EngineError> {
        self.accept(EngineCall::PeriodOfRecord { job_id, sensor_id })
    }

    fn stop(&self) {
        self.state().stops += 1;
    }
}
