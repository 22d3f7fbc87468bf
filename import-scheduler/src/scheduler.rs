//! The single-flight import scheduler.
//!
//! [`ImportScheduler`] owns three collections:
//!
//! - the pending queue, started in submission order,
//! - at most one in-flight job handed to the [`FetchEngine`],
//! - the history of finished jobs, newest first.
//!
//! Every public operation and every engine signal handler runs under one state lock, so a
//! submission can never interleave with a finish signal. The engine is called while the lock is
//! held and must therefore never block, see [`FetchEngine`].
//!
//! Engine signals reach the scheduler either by calling [`ImportScheduler::handle_event`] (and
//! the more specific handlers) directly, or by spawning a listener task with
//! [`ImportScheduler::spawn_listener`].
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use chrono::NaiveDate;
use tracing::instrument;

use crate::{
    config::SchedulerConfig,
    engine::{EngineError, EngineEvent, FetchEngine, RunOutcome},
    job::{range::DateRange, InvalidRequest, Job, JobId, JobKind},
    sensor::SensorType,
    SchedulerError,
};

pub mod listener;
pub mod snapshot;

use snapshot::StatusSnapshot;

const TIME_SERIES_LABEL: &str = "Import TimeSeries";
const DAILY_LABEL: &str = "Import DailyData";
const MONTHLY_LABEL: &str = "Import MonthlyData";
const SEASONAL_FORECAST_LABEL: &str = "Import B120Data";
const STATION_SENSORS_LABEL: &str = "Import StationSensors";
const PERIOD_OF_RECORD_LABEL: &str = "Import PeriodOfRecord";

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<Job>,
    in_flight: Option<Job>,
    history: VecDeque<Job>,
}

/// Serializes import jobs against a single [`FetchEngine`].
#[derive(Debug)]
pub struct ImportScheduler<E: FetchEngine> {
    engine: E,
    config: SchedulerConfig,
    state: Mutex<State>,
}

impl<E> ImportScheduler<E>
where
    E: FetchEngine,
{
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, SchedulerConfig::default())
    }

    /// Construct a scheduler, handing the engine settings of `config` to `engine`.
    pub fn with_config(engine: E, config: SchedulerConfig) -> Self {
        engine.configure(config.engine());
        Self {
            engine,
            config,
            state: Default::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Submit a time series import of `sensors` over `start..=end`.
    pub fn submit_time_series_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        sensors: impl IntoIterator<Item = SensorType>,
    ) -> Result<JobId, SchedulerError> {
        let kind = JobKind::time_series(DateRange::new(start, end)?, sensors)?;
        self.submit(TIME_SERIES_LABEL, kind)
    }

    /// Submit a daily import between two optional dates.
    ///
    /// See [`DateRange::daily`] for how missing dates are filled in.
    pub fn submit_daily_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<JobId, SchedulerError> {
        let range = DateRange::daily(
            start,
            end,
            self.config.today(),
            self.config.default_import_days(),
        )?;
        self.submit(DAILY_LABEL, JobKind::time_series(range, SensorType::DAILY)?)
    }

    /// Submit a daily import of `days` days up to `end`.
    pub fn submit_daily_days(
        &self,
        end: Option<NaiveDate>,
        days: Option<i64>,
    ) -> Result<JobId, SchedulerError> {
        let range = DateRange::daily_ending(
            end,
            days,
            self.config.today(),
            self.config.default_import_days(),
        )?;
        self.submit(DAILY_LABEL, JobKind::time_series(range, SensorType::DAILY)?)
    }

    /// Submit a monthly import between two optional dates.
    ///
    /// See [`DateRange::monthly`] for how missing dates are filled in.
    pub fn submit_monthly_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<JobId, SchedulerError> {
        let range = DateRange::monthly(
            start,
            end,
            self.config.today(),
            self.config.default_import_months(),
        )?;
        self.submit(
            MONTHLY_LABEL,
            JobKind::time_series(range, SensorType::MONTHLY)?,
        )
    }

    /// Submit a monthly import of `months` months up to `end`.
    pub fn submit_monthly_months(
        &self,
        end: Option<NaiveDate>,
        months: Option<i64>,
    ) -> Result<JobId, SchedulerError> {
        let range = DateRange::monthly_ending(
            end,
            months,
            self.config.today(),
            self.config.default_import_months(),
        )?;
        self.submit(
            MONTHLY_LABEL,
            JobKind::time_series(range, SensorType::MONTHLY)?,
        )
    }

    /// Submit an import of the seasonal forecast sensors for `num_years` water years ending with
    /// `end_water_year`.
    pub fn submit_seasonal_forecast_range(
        &self,
        end_water_year: Option<i32>,
        num_years: Option<i32>,
    ) -> Result<JobId, SchedulerError> {
        let range = DateRange::water_years(end_water_year, num_years, self.config.today())?;
        self.submit(
            SEASONAL_FORECAST_LABEL,
            JobKind::time_series(range, SensorType::SEASONAL_FORECAST)?,
        )
    }

    pub fn submit_station_sensor_snapshot(&self) -> Result<JobId, SchedulerError> {
        self.submit(STATION_SENSORS_LABEL, JobKind::StationSensorSnapshot)
    }

    pub fn submit_period_of_record(&self, sensor_id: i64) -> Result<JobId, SchedulerError> {
        self.submit(
            PERIOD_OF_RECORD_LABEL,
            JobKind::period_of_record(sensor_id)?,
        )
    }

    /// Submit one period of record job per sensor id.
    ///
    /// All ids are validated first: if any is invalid nothing is queued.
    pub fn submit_period_of_record_batch(
        &self,
        sensor_ids: impl IntoIterator<Item = i64>,
    ) -> Result<Vec<JobId>, SchedulerError> {
        let jobs = sensor_ids
            .into_iter()
            .map(|sensor_id| {
                JobKind::period_of_record(sensor_id)
                    .map(|kind| Job::new(PERIOD_OF_RECORD_LABEL, kind))
            })
            .collect::<Result<Vec<_>, InvalidRequest>>()?;
        self.enqueue(jobs)
    }

    /// The pending, in-flight and finished jobs.
    ///
    /// Starts the next pending job if nothing is in flight and refreshes the progress of the
    /// in-flight job first. This never finishes a job, even when the engine reports idle: only
    /// engine signals do.
    pub fn status_snapshot(&self) -> Result<StatusSnapshot, SchedulerError> {
        let mut state = self.lock()?;
        self.dispatch(&mut state);
        if self.engine.is_busy() {
            self.refresh_progress(&mut state);
        }
        Ok(StatusSnapshot {
            requests: state.pending.iter().cloned().collect(),
            executing: state.in_flight.clone(),
            history: state.history.iter().cloned().collect(),
        })
    }

    /// Look up a job wherever it currently is.
    pub fn find_job(&self, job_id: JobId) -> Result<Option<Job>, SchedulerError> {
        let state = self.lock()?;
        let job = state
            .in_flight
            .iter()
            .chain(&state.pending)
            .chain(&state.history)
            .find(|job| job.id() == job_id)
            .cloned();
        Ok(job)
    }

    /// Discard all finished jobs.
    pub fn reset_history(&self) -> Result<(), SchedulerError> {
        let mut state = self.lock()?;
        let discarded = state.history.len();
        state.history.clear();
        tracing::info!(discarded, "Import history reset");
        Ok(())
    }

    /// Discard all pending jobs and ask the engine to stop the in-flight one.
    ///
    /// Discarded jobs never started and do not appear in the history. The in-flight job is left
    /// executing until the engine signals that its run finished. Returns the number of discarded
    /// jobs.
    pub fn cancel_all(&self) -> Result<usize, SchedulerError> {
        let mut state = self.lock()?;
        let discarded = state.pending.len();
        state.pending.clear();
        if let Some(job) = &state.in_flight {
            tracing::info!(job_id = %job.id(), "Requesting fetch engine to stop");
            self.engine.stop();
        }
        tracing::info!(discarded, "Cancelled pending import jobs");
        Ok(discarded)
    }

    /// Feed a single engine event to the matching handler.
    pub fn handle_event(&self, event: EngineEvent) -> Result<(), SchedulerError> {
        match event {
            EngineEvent::ProgressChanged => self.on_progress_changed(),
            EngineEvent::RunFinished { job_id, outcome } => self.on_run_finished(job_id, outcome),
        }
    }

    /// Handle the engine's progress signal.
    ///
    /// An idle engine means the run finished before its finish signal arrived, so the in-flight
    /// job is finished here using the engine's last error. With nothing in flight the next pending
    /// job is started instead.
    #[instrument(skip(self))]
    pub fn on_progress_changed(&self) -> Result<(), SchedulerError> {
        let mut state = self.lock()?;
        if self.engine.is_busy() {
            self.refresh_progress(&mut state);
            return Ok(());
        }
        if let Some(job) = &state.in_flight {
            let job_id = job.id();
            tracing::debug!(%job_id, "Fetch engine idle on progress signal, finishing job");
            let outcome = match self.engine.last_error() {
                Some(message) => RunOutcome::failed(message),
                None => RunOutcome::Succeeded,
            };
            self.finish(&mut state, outcome);
        } else {
            self.dispatch(&mut state);
        }
        Ok(())
    }

    /// Handle the engine's finish signal for the run of `job_id`.
    ///
    /// Signals for a job that is no longer in flight do not finish anything, but still start the
    /// next pending job when the engine is free.
    #[instrument(skip_all, fields(%job_id))]
    pub fn on_run_finished(&self, job_id: JobId, outcome: RunOutcome) -> Result<(), SchedulerError> {
        let mut state = self.lock()?;
        match state.in_flight.as_ref().map(Job::id) {
            Some(in_flight) if in_flight == job_id => self.finish(&mut state, outcome),
            in_flight => {
                tracing::debug!(
                    ?in_flight,
                    "Ignoring finish signal for a job that is not in flight"
                );
                self.dispatch(&mut state);
            }
        }
        Ok(())
    }

    fn submit(&self, label: &'static str, kind: JobKind) -> Result<JobId, SchedulerError> {
        let job_id = self
            .enqueue([Job::new(label, kind)])?
            .into_iter()
            .next()
            .ok_or(SchedulerError::BadState)?;
        Ok(job_id)
    }

    fn enqueue(&self, jobs: impl IntoIterator<Item = Job>) -> Result<Vec<JobId>, SchedulerError> {
        let mut state = self.lock()?;
        let job_ids = jobs
            .into_iter()
            .map(|job| {
                let job_id = job.id();
                tracing::debug!(%job_id, request_type = job.label(), "Import job submitted");
                state.pending.push_back(job);
                job_id
            })
            .collect::<Vec<_>>();
        self.dispatch(&mut state);
        Ok(job_ids)
    }

    /// Start pending jobs until one is accepted by the engine.
    ///
    /// Jobs the engine rejects synchronously are failed and moved to the history without retry.
    fn dispatch(&self, state: &mut State) {
        while state.in_flight.is_none() && !state.pending.is_empty() && !self.engine.is_busy() {
            let Some(mut job) = state.pending.pop_front() else {
                break;
            };
            job.start_execution();
            let job_id = job.id();
            match self.start_run(&job) {
                Ok(()) => {
                    tracing::debug!(%job_id, request_type = job.label(), "Import job dispatched");
                    state.in_flight = Some(job);
                }
                Err(err) => {
                    tracing::warn!(?err, %job_id, "Fetch engine rejected import job");
                    if let Err(err) = job.fail(Some(err.to_string().as_str())) {
                        tracing::error!(?err, %job_id, "Failed to mark rejected job as failed");
                    }
                    self.archive(state, job);
                }
            }
        }
    }

    fn start_run(&self, job: &Job) -> Result<(), EngineError> {
        match job.kind() {
            JobKind::TimeSeriesRange { range, sensors } => {
                let sensors: Vec<_> = sensors.iter().copied().collect();
                self.engine.import_time_series(job.id(), range, &sensors)
            }
            JobKind::StationSensorSnapshot => self.engine.import_station_sensors(job.id()),
            JobKind::PeriodOfRecord { sensor_id } => {
                self.engine.import_period_of_record(job.id(), *sensor_id)
            }
        }
    }

    fn refresh_progress(&self, state: &mut State) {
        if let (Some(job), Some(fraction)) = (state.in_flight.as_mut(), self.engine.progress()) {
            job.set_progress((fraction * 100.0).round() as i64);
        }
    }

    fn finish(&self, state: &mut State, outcome: RunOutcome) {
        let Some(mut job) = state.in_flight.take() else {
            return;
        };
        let job_id = job.id();
        let result = match outcome {
            RunOutcome::Succeeded => {
                tracing::info!(%job_id, request_type = job.label(), "Import job completed");
                job.complete_execution()
            }
            RunOutcome::Failed { message } => {
                tracing::warn!(%job_id, error = %message, "Import job failed");
                job.fail(Some(message.as_str()))
            }
        };
        if let Err(err) = result {
            tracing::error!(?err, %job_id, "Failed to finish import job");
        }
        self.archive(state, job);
        self.dispatch(state);
    }

    fn archive(&self, state: &mut State, job: Job) {
        state.history.push_front(job);
        if let Some(limit) = self.config.max_history() {
            state.history.truncate(limit);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, SchedulerError> {
        self.state.lock().map_err(|err| {
            tracing::error!(?err, "Import scheduler state lock poisoned");
            SchedulerError::BadState
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use mockall::predicate::eq;

    use super::*;
    use crate::{
        engine::{EngineConfig, MockFetchEngine},
        job::JobStatus,
        testing::{EngineCall, ManualEngine},
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn scheduler() -> (Arc<ManualEngine>, ImportScheduler<Arc<ManualEngine>>) {
        let engine = Arc::new(ManualEngine::new());
        let scheduler = ImportScheduler::new(engine.clone());
        (engine, scheduler)
    }

    fn finish_current(
        engine: &ManualEngine,
        scheduler: &ImportScheduler<Arc<ManualEngine>>,
        outcome: RunOutcome,
    ) {
        let job_id = scheduler
            .status_snapshot()
            .unwrap()
            .executing
            .expect("a job in flight")
            .id();
        engine.finish();
        scheduler.on_run_finished(job_id, outcome).unwrap();
    }

    fn executing_id(scheduler: &ImportScheduler<Arc<ManualEngine>>) -> Option<JobId> {
        scheduler
            .status_snapshot()
            .unwrap()
            .executing
            .map(|job| job.id())
    }

    fn sorted(sensors: &[SensorType]) -> Vec<SensorType> {
        let mut sensors = sensors.to_vec();
        sensors.sort();
        sensors
    }

    #[test]
    fn hands_engine_config_to_engine() {
        let config = SchedulerConfig::new()
            .with_engine(EngineConfig::new().with_max_concurrency(3).with_max_connection_retries(1));
        let mut engine = MockFetchEngine::new();
        engine
            .expect_configure()
            .with(eq(config.engine()))
            .times(1)
            .return_const(());

        let scheduler = ImportScheduler::with_config(engine, config);
        assert_eq!(scheduler.config().engine().max_concurrency, 3);
    }

    #[test]
    fn first_submission_starts_immediately() {
        let (engine, scheduler) = scheduler();

        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.requests.is_empty());
        let executing = snapshot.executing.unwrap();
        assert_eq!(executing.id(), job_id);
        assert_eq!(executing.status(), JobStatus::Executing);
        assert!(executing.started_at().is_some());
        assert_eq!(engine.calls(), vec![EngineCall::StationSensors { job_id }]);
    }

    #[test]
    fn starts_one_job_at_a_time_in_submission_order() {
        let (engine, scheduler) = scheduler();
        let first = scheduler.submit_station_sensor_snapshot().unwrap();
        let second = scheduler.submit_period_of_record(12).unwrap();
        let third = scheduler.submit_station_sensor_snapshot().unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.executing.map(|job| job.id()), Some(first));
        assert_eq!(
            snapshot.requests.iter().map(Job::id).collect::<Vec<_>>(),
            vec![second, third]
        );
        assert!(snapshot
            .requests
            .iter()
            .all(|job| job.status() == JobStatus::Pending));
        assert_eq!(engine.started_jobs(), vec![first]);

        finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        assert_eq!(executing_id(&scheduler), Some(second));
        finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        assert_eq!(executing_id(&scheduler), Some(third));
        finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        assert_eq!(executing_id(&scheduler), None);

        assert_eq!(engine.started_jobs(), vec![first, second, third]);
    }

    #[test]
    fn engine_reporting_idle_after_accepting_does_not_complete_job() {
        let engine = Arc::new(ManualEngine::new().idle_on_accept());
        let scheduler = ImportScheduler::new(engine.clone());

        let job_id = scheduler
            .submit_time_series_range(date(2021, 1, 1), date(2021, 1, 31), SensorType::DAILY)
            .unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        let executing = snapshot.executing.unwrap();
        assert_eq!(executing.id(), job_id);
        assert_eq!(executing.status(), JobStatus::Executing);
        assert!(snapshot.history.is_empty());

        // A later submission must not start alongside the in-flight job.
        let next = scheduler.submit_station_sensor_snapshot().unwrap();
        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.executing.unwrap().status(), JobStatus::Executing);
        assert_eq!(snapshot.requests[0].id(), next);
        assert_eq!(engine.started_jobs(), vec![job_id]);
    }

    #[test]
    fn history_lists_finished_jobs_newest_first() {
        let (engine, scheduler) = scheduler();
        let ids: Vec<_> = (0..3)
            .map(|_| scheduler.submit_station_sensor_snapshot().unwrap())
            .collect();

        for _ in 0..3 {
            finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        }

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.requests.is_empty());
        assert!(snapshot.executing.is_none());
        assert_eq!(
            snapshot.history.iter().map(Job::id).collect::<Vec<_>>(),
            ids.into_iter().rev().collect::<Vec<_>>()
        );
        assert!(snapshot.history.iter().all(|job| {
            job.status() == JobStatus::Completed && job.percent_complete() == 100
        }));
    }

    #[test]
    fn rejects_non_positive_sensor_id() {
        let (engine, scheduler) = scheduler();

        assert_matches!(
            scheduler.submit_period_of_record(-5),
            Err(SchedulerError::InvalidRequest(
                InvalidRequest::NonPositiveSensorId(-5)
            ))
        );

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.requests.is_empty());
        assert!(snapshot.executing.is_none());
        assert!(snapshot.history.is_empty());
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn rejects_invalid_time_series_requests() {
        let (engine, scheduler) = scheduler();

        assert_matches!(
            scheduler.submit_time_series_range(date(2021, 2, 1), date(2021, 1, 1), SensorType::DAILY),
            Err(SchedulerError::InvalidRequest(InvalidRequest::EmptyRange { .. }))
        );
        assert_matches!(
            scheduler.submit_time_series_range(
                date(2021, 1, 1),
                date(2021, 2, 1),
                std::iter::empty()
            ),
            Err(SchedulerError::InvalidRequest(InvalidRequest::NoSensors))
        );
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn cancel_all_discards_pending_and_stops_in_flight_job() {
        let (engine, scheduler) = scheduler();
        let running = scheduler.submit_station_sensor_snapshot().unwrap();
        scheduler.submit_period_of_record(1).unwrap();
        scheduler.submit_period_of_record(2).unwrap();

        assert_eq!(scheduler.cancel_all().unwrap(), 2);

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.requests.is_empty());
        let executing = snapshot.executing.unwrap();
        assert_eq!(executing.id(), running);
        assert_eq!(executing.status(), JobStatus::Executing);
        assert!(snapshot.history.is_empty());
        assert_eq!(engine.stop_count(), 1);
        assert_eq!(engine.started_jobs(), vec![running]);

        finish_current(
            &engine,
            &scheduler,
            RunOutcome::failed("Import stopped before completion"),
        );

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.executing.is_none());
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].status(), JobStatus::Failed);
        assert_eq!(engine.started_jobs(), vec![running]);
    }

    #[test]
    fn cancel_all_without_in_flight_job_does_not_stop_engine() {
        let (engine, scheduler) = scheduler();
        assert_eq!(scheduler.cancel_all().unwrap(), 0);
        assert_eq!(engine.stop_count(), 0);
    }

    #[test]
    fn failed_run_is_recorded_and_next_job_starts() {
        let (engine, scheduler) = scheduler();
        let failing = scheduler.submit_station_sensor_snapshot().unwrap();
        let next = scheduler.submit_period_of_record(7).unwrap();

        engine.finish();
        scheduler
            .on_run_finished(failing, RunOutcome::failed("Connection reset by peer"))
            .unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.history[0].id(), failing);
        assert_eq!(snapshot.history[0].status(), JobStatus::Failed);
        assert_eq!(snapshot.history[0].error(), Some("Connection reset by peer"));
        assert_eq!(snapshot.history[0].percent_complete(), 0);
        assert_eq!(snapshot.executing.map(|job| job.id()), Some(next));
    }

    #[test]
    fn synchronous_rejection_fails_job_and_moves_on() {
        let (engine, scheduler) = scheduler();
        let first = scheduler.submit_station_sensor_snapshot().unwrap();
        let rejected = scheduler.submit_period_of_record(3).unwrap();
        let third = scheduler.submit_period_of_record(4).unwrap();

        engine.reject_next(EngineError::Rejected("Unknown sensor 3".to_owned()));
        finish_current(&engine, &scheduler, RunOutcome::Succeeded);

        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.executing.map(|job| job.id()), Some(third));
        assert_eq!(
            snapshot.history.iter().map(Job::id).collect::<Vec<_>>(),
            vec![rejected, first]
        );
        assert_eq!(snapshot.history[0].status(), JobStatus::Failed);
        assert_eq!(snapshot.history[0].error(), Some("Unknown sensor 3"));
        assert_eq!(engine.started_jobs(), vec![first, rejected, third]);
    }

    #[test]
    fn rejected_first_submission_leaves_scheduler_idle() {
        let (engine, scheduler) = scheduler();
        engine.reject_next(EngineError::Busy);

        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();

        let job = scheduler.find_job(job_id).unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(
            job.error(),
            Some("Cannot launch request because the fetch engine is busy")
        );
        assert!(scheduler.status_snapshot().unwrap().executing.is_none());
    }

    #[test]
    fn busy_engine_holds_back_dispatch() {
        let mut engine = MockFetchEngine::new();
        engine.expect_configure().return_const(());
        engine.expect_is_busy().return_const(true);
        engine.expect_progress().return_const(None);
        engine.expect_import_station_sensors().never();
        let scheduler = ImportScheduler::new(engine);

        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.executing.is_none());
        assert_eq!(snapshot.requests[0].id(), job_id);
        assert_eq!(snapshot.requests[0].status(), JobStatus::Pending);
    }

    #[test]
    fn queued_job_starts_on_signal_once_engine_frees_up() {
        let (engine, scheduler) = scheduler();
        engine.set_busy(true);
        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();
        assert!(engine.calls().is_empty());

        engine.finish();
        scheduler
            .on_run_finished(JobId::from(u64::MAX), RunOutcome::Succeeded)
            .unwrap();

        let job = scheduler.find_job(job_id).unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Executing);
        assert_eq!(engine.started_jobs(), vec![job_id]);
        assert!(scheduler.status_snapshot().unwrap().history.is_empty());
    }

    #[test]
    fn idle_progress_signal_starts_queued_job() {
        let (engine, scheduler) = scheduler();
        engine.set_busy(true);
        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();

        engine.set_busy(false);
        scheduler.on_progress_changed().unwrap();

        assert_eq!(executing_id(&scheduler), Some(job_id));
        assert!(scheduler.status_snapshot().unwrap().history.is_empty());
    }

    #[test]
    fn status_snapshot_starts_queued_job_once_engine_frees_up() {
        let (engine, scheduler) = scheduler();
        engine.set_busy(true);
        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();
        assert_eq!(scheduler.status_snapshot().unwrap().requests[0].id(), job_id);

        engine.set_busy(false);

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.requests.is_empty());
        assert_eq!(snapshot.executing.map(|job| job.id()), Some(job_id));
        assert_eq!(engine.started_jobs(), vec![job_id]);
    }

    #[test]
    fn time_series_dispatch_passes_range_and_sensors() {
        let mut engine = MockFetchEngine::new();
        engine.expect_configure().return_const(());
        engine.expect_is_busy().return_const(false);
        engine
            .expect_import_time_series()
            .withf(|_, range, sensors| {
                range.start() == date(2021, 1, 1)
                    && range.end() == date(2021, 1, 31)
                    && sensors.len() == 2
                    && sensors.contains(&SensorType::DailyPrecip)
                    && sensors.contains(&SensorType::MonthlyPrecip)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let scheduler = ImportScheduler::new(engine);

        scheduler
            .submit_time_series_range(
                date(2021, 1, 1),
                date(2021, 1, 31),
                [
                    SensorType::MonthlyPrecip,
                    SensorType::DailyPrecip,
                    SensorType::DailyPrecip,
                ],
            )
            .unwrap();
    }

    #[test]
    fn progress_signal_updates_in_flight_job() {
        let (engine, scheduler) = scheduler();
        let job_id = scheduler.submit_station_sensor_snapshot().unwrap();

        engine.set_progress(Some(0.424));
        scheduler.on_progress_changed().unwrap();
        assert_eq!(
            scheduler.find_job(job_id).unwrap().unwrap().percent_complete(),
            42
        );

        engine.set_progress(Some(0.3));
        scheduler.handle_event(EngineEvent::ProgressChanged).unwrap();
        assert_eq!(
            scheduler.find_job(job_id).unwrap().unwrap().percent_complete(),
            42
        );

        engine.set_progress(Some(0.5));
        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.executing.unwrap().percent_complete(), 50);
    }

    #[test]
    fn progress_signal_from_idle_engine_finishes_job() {
        let (engine, scheduler) = scheduler();
        let completed = scheduler.submit_station_sensor_snapshot().unwrap();
        let failed = scheduler.submit_station_sensor_snapshot().unwrap();
        let last = scheduler.submit_station_sensor_snapshot().unwrap();

        engine.finish();
        scheduler.on_progress_changed().unwrap();
        assert_eq!(
            scheduler.find_job(completed).unwrap().unwrap().status(),
            JobStatus::Completed
        );
        assert_eq!(executing_id(&scheduler), Some(failed));

        engine.finish();
        engine.set_last_error(Some("Too many connection failures"));
        scheduler.on_progress_changed().unwrap();
        let job = scheduler.find_job(failed).unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("Too many connection failures"));
        assert_eq!(executing_id(&scheduler), Some(last));
    }

    #[test]
    fn stale_finish_signal_is_ignored() {
        let (engine, scheduler) = scheduler();
        let first = scheduler.submit_station_sensor_snapshot().unwrap();
        let second = scheduler.submit_station_sensor_snapshot().unwrap();

        engine.finish();
        scheduler.on_progress_changed().unwrap();
        assert_eq!(executing_id(&scheduler), Some(second));

        scheduler
            .handle_event(EngineEvent::RunFinished {
                job_id: first,
                outcome: RunOutcome::Succeeded,
            })
            .unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.executing.unwrap().status(), JobStatus::Executing);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[test]
    fn finish_signal_without_in_flight_job_is_ignored() {
        let (_engine, scheduler) = scheduler();
        scheduler
            .on_run_finished(JobId::from(u64::MAX), RunOutcome::Succeeded)
            .unwrap();
        assert!(scheduler.status_snapshot().unwrap().history.is_empty());
    }

    #[test]
    fn reset_history_clears_finished_jobs() {
        let (engine, scheduler) = scheduler();
        for _ in 0..4 {
            scheduler.submit_station_sensor_snapshot().unwrap();
        }
        for _ in 0..3 {
            finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        }
        assert_eq!(scheduler.status_snapshot().unwrap().history.len(), 3);

        scheduler.reset_history().unwrap();

        let snapshot = scheduler.status_snapshot().unwrap();
        assert!(snapshot.history.is_empty());
        assert!(snapshot.executing.is_some());
    }

    #[test]
    fn history_is_bounded_when_configured() {
        let engine = Arc::new(ManualEngine::new());
        let scheduler = ImportScheduler::with_config(
            engine.clone(),
            SchedulerConfig::new().with_max_history(Some(2)),
        );
        let ids: Vec<_> = (0..3)
            .map(|_| scheduler.submit_station_sensor_snapshot().unwrap())
            .collect();
        for _ in 0..3 {
            finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        }

        let history = scheduler.status_snapshot().unwrap().history;
        assert_eq!(
            history.iter().map(Job::id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );
        assert_eq!(engine.configured(), Some(EngineConfig::default()));
    }

    #[test]
    fn period_of_record_batch_is_validated_up_front() {
        let (engine, scheduler) = scheduler();

        assert_matches!(
            scheduler.submit_period_of_record_batch([4, 0, 9]),
            Err(SchedulerError::InvalidRequest(
                InvalidRequest::NonPositiveSensorId(0)
            ))
        );
        assert!(engine.calls().is_empty());

        let ids = scheduler.submit_period_of_record_batch([4, 9]).unwrap();
        let snapshot = scheduler.status_snapshot().unwrap();
        assert_eq!(snapshot.executing.map(|job| job.id()), Some(ids[0]));
        assert_eq!(snapshot.requests[0].id(), ids[1]);
        assert_matches!(
            engine.calls().as_slice(),
            [EngineCall::PeriodOfRecord { sensor_id, .. }] if sensor_id.get() == 4
        );
    }

    #[test]
    fn daily_submissions_import_daily_sensors() {
        let (engine, scheduler) = scheduler();

        let job_id = scheduler
            .submit_daily_days(Some(date(2021, 3, 1)), Some(10))
            .unwrap();

        assert_eq!(
            engine.calls(),
            vec![EngineCall::TimeSeries {
                job_id,
                range: DateRange::new(date(2021, 2, 19), date(2021, 3, 1)).unwrap(),
                sensors: sorted(&SensorType::DAILY),
            }]
        );
        let job = scheduler.find_job(job_id).unwrap().unwrap();
        assert_eq!(job.label(), "Import DailyData");

        finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        scheduler
            .submit_daily_range(Some(date(2021, 1, 1)), Some(date(2021, 1, 31)))
            .unwrap();
        assert_matches!(
            engine.calls().last(),
            Some(EngineCall::TimeSeries { range, .. })
                if range.start() == date(2021, 1, 1) && range.end() == date(2021, 1, 31)
        );
    }

    #[test]
    fn monthly_submissions_import_monthly_sensors() {
        let (engine, scheduler) = scheduler();

        let job_id = scheduler
            .submit_monthly_range(Some(date(2020, 11, 20)), Some(date(2021, 3, 9)))
            .unwrap();
        assert_eq!(
            engine.calls(),
            vec![EngineCall::TimeSeries {
                job_id,
                range: DateRange::new(date(2020, 11, 1), date(2021, 3, 1)).unwrap(),
                sensors: sorted(&SensorType::MONTHLY),
            }]
        );
        assert_eq!(
            scheduler.find_job(job_id).unwrap().unwrap().label(),
            "Import MonthlyData"
        );

        finish_current(&engine, &scheduler, RunOutcome::Succeeded);
        scheduler
            .submit_monthly_months(Some(date(2021, 3, 9)), Some(3))
            .unwrap();
        assert_matches!(
            engine.calls().last(),
            Some(EngineCall::TimeSeries { range, .. })
                if range.start() == date(2020, 12, 1) && range.end() == date(2021, 3, 1)
        );
    }

    #[test]
    fn seasonal_forecast_submission_uses_water_years() {
        let (engine, scheduler) = scheduler();

        let job_id = scheduler
            .submit_seasonal_forecast_range(Some(2020), Some(2))
            .unwrap();

        assert_eq!(
            engine.calls(),
            vec![EngineCall::TimeSeries {
                job_id,
                range: DateRange::new(date(2018, 10, 1), date(2020, 9, 30)).unwrap(),
                sensors: sorted(&SensorType::SEASONAL_FORECAST),
            }]
        );
        assert_eq!(
            scheduler.find_job(job_id).unwrap().unwrap().label(),
            "Import B120Data"
        );
    }

    #[test]
    fn find_job_searches_all_collections() {
        let (engine, scheduler) = scheduler();
        let finished = scheduler.submit_station_sensor_snapshot().unwrap();
        let running = scheduler.submit_station_sensor_snapshot().unwrap();
        let pending = scheduler.submit_station_sensor_snapshot().unwrap();
        finish_current(&engine, &scheduler, RunOutcome::Succeeded);

        let status = |job_id| scheduler.find_job(job_id).unwrap().map(|job| job.status());
        assert_eq!(status(finished), Some(JobStatus::Completed));
        assert_eq!(status(running), Some(JobStatus::Executing));
        assert_eq!(status(pending), Some(JobStatus::Pending));
        assert_eq!(status(JobId::from(u64::MAX)), None);
    }
}
