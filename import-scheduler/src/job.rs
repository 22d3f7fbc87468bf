//! Import jobs and their lifecycle.
//!
//! A [`Job`] is created by one of the submission methods of
//! [`crate::scheduler::ImportScheduler`] and is owned by the scheduler from then on. Its
//! parameters ([`JobKind`]) never change, while its [`JobStatus`] moves through
//!
//! ```text
//! Pending -> Executing -> Completed
//!                      -> Failed
//! ```
//!
//! Completed and failed jobs are terminal and are never modified again.
use std::{
    collections::BTreeSet,
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::sensor::SensorType;

pub mod range;

use range::DateRange;

/// The message recorded when a job fails without a usable error message.
pub const UNKNOWN_ERROR: &str = "Unknown error.";

const WIRE_DATE_FORMAT: &str = "%m/%d/%Y";

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// The unique identifier of a job.
///
/// Identifiers are allocated from a process wide counter and are never reused.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<JobId> for u64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// A validated, strictly positive remote sensor identifier.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize)]
#[serde(transparent)]
pub struct SensorId(u32);

impl SensorId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for SensorId {
    type Error = InvalidRequest;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u32::try_from(value) {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(InvalidRequest::NonPositiveSensorId(value)),
        }
    }
}

impl Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind specific, immutable parameters of a job.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum JobKind {
    /// Import the selected sensor series over a date range.
    TimeSeriesRange {
        range: DateRange,
        sensors: BTreeSet<SensorType>,
    },
    /// Import the station and sensor metadata.
    StationSensorSnapshot,
    /// Import the full period of record of a single sensor.
    PeriodOfRecord { sensor_id: SensorId },
}

impl JobKind {
    /// Construct a time series kind, rejecting an empty sensor selection.
    pub fn time_series(
        range: DateRange,
        sensors: impl IntoIterator<Item = SensorType>,
    ) -> Result<Self, InvalidRequest> {
        let sensors: BTreeSet<_> = sensors.into_iter().collect();
        if sensors.is_empty() {
            return Err(InvalidRequest::NoSensors);
        }
        Ok(Self::TimeSeriesRange { range, sensors })
    }

    pub fn period_of_record(sensor_id: i64) -> Result<Self, InvalidRequest> {
        Ok(Self::PeriodOfRecord {
            sensor_id: sensor_id.try_into()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub enum JobStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Errors rejecting a submission before any job is created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("Start date {start} must be before end date {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },
    #[error("At least one sensor type must be selected")]
    NoSensors,
    #[error("Sensor id must be a positive integer, got {0}")]
    NonPositiveSensorId(i64),
    #[error("Date is outside of the supported calendar range")]
    DateOutOfRange,
}

/// Returned when a lifecycle transition is attempted from the wrong status.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Cannot move job {job_id} from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A unit of import work.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    label: &'static str,
    kind: JobKind,
    status: JobStatus,
    percent_complete: u8,
    error: Option<String>,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(label: &'static str, kind: JobKind) -> Self {
        Self {
            id: JobId::next(),
            label,
            kind,
            status: JobStatus::Pending,
            percent_complete: 0,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// The human readable request type, e.g. `"Import DailyData"`.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// The completion percentage derived from the status.
    ///
    /// Pending and failed jobs report 0 and completed jobs 100.
    pub fn percent_complete(&self) -> u8 {
        match self.status {
            JobStatus::Pending | JobStatus::Failed => 0,
            JobStatus::Executing => self.percent_complete,
            JobStatus::Completed => 100,
        }
    }

    /// The failure message, only present for failed jobs.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Mark the job as executing.
    ///
    /// # Panics
    ///
    /// Panics if the job is not pending. The scheduler only starts jobs it has just taken off the
    /// pending queue, so this indicates a bug rather than a recoverable condition.
    pub(crate) fn start_execution(&mut self) {
        assert_eq!(
            self.status,
            JobStatus::Pending,
            "job {} can only start execution while pending",
            self.id
        );
        self.status = JobStatus::Executing;
        self.percent_complete = 0;
        self.started_at = Some(Utc::now());
    }

    /// Record progress, clamped to `0..=100`. Ignored unless the job is executing.
    ///
    /// Progress never moves backwards.
    pub(crate) fn set_progress(&mut self, percent: i64) {
        if self.status == JobStatus::Executing {
            let percent = percent.clamp(0, 100) as u8;
            self.percent_complete = self.percent_complete.max(percent);
        }
    }

    pub(crate) fn complete_execution(&mut self) -> Result<(), InvalidTransition> {
        self.finish(JobStatus::Completed)?;
        self.percent_complete = 100;
        Ok(())
    }

    /// Mark the job as failed, substituting [`UNKNOWN_ERROR`] for a blank message.
    pub(crate) fn fail(&mut self, message: Option<&str>) -> Result<(), InvalidTransition> {
        self.finish(JobStatus::Failed)?;
        let message = message
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or(UNKNOWN_ERROR);
        self.error = Some(message.to_owned());
        self.percent_complete = 0;
        Ok(())
    }

    fn finish(&mut self, to: JobStatus) -> Result<(), InvalidTransition> {
        if self.status != JobStatus::Executing {
            return Err(InvalidTransition {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireJob<'a> {
    request_id: String,
    request_type: &'a str,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    perc_completed: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_id: Option<SensorId>,
}

impl<'a> From<&'a Job> for WireJob<'a> {
    fn from(job: &'a Job) -> Self {
        let perc_completed = matches!(job.status, JobStatus::Executing | JobStatus::Completed)
            .then(|| job.percent_complete());
        let (start_date, end_date, sensor_id) = match &job.kind {
            JobKind::TimeSeriesRange { range, .. } => (
                Some(range.start().format(WIRE_DATE_FORMAT).to_string()),
                Some(range.end().format(WIRE_DATE_FORMAT).to_string()),
                None,
            ),
            JobKind::StationSensorSnapshot => (None, None, None),
            JobKind::PeriodOfRecord { sensor_id } => (None, None, Some(*sensor_id)),
        };
        Self {
            request_id: job.id.0.to_string(),
            request_type: job.label,
            status: job.status,
            perc_completed,
            error: job.error(),
            start_date,
            end_date,
            sensor_id,
        }
    }
}

impl Serialize for Job {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        WireJob::from(self).serialize(serializer)
    }
}
