//! Provides an in-process implementation of [`FetchEngine`].
//!
//! [`SimulatedEngine`] does not talk to a remote source. It splits every run into individual
//! fetches, "performs" each one by sleeping for a configurable amount of time and can be told to
//! fail a number of connection attempts per fetch to exercise the reconnect logic. It is a
//! correct implementation of the engine contract and is useful for demos and tests.
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{
    backoff::ReconnectBackoff, EngineConfig, EngineError, FetchEngine, RunOutcome, Signals,
};
use crate::{
    job::{range::DateRange, JobId, SensorId},
    sensor::SensorType,
};

const STOPPED_MESSAGE: &str = "Import stopped before completion";

#[derive(Debug, Clone)]
enum Fetch {
    Series { sensor: SensorType, range: DateRange },
    Stations,
    Sensors,
    SensorDefinitions,
    PeriodOfRecord(SensorId),
}

impl Display for Fetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Series { sensor, range } => {
                write!(f, "{sensor} from {} to {}", range.start(), range.end())
            }
            Self::Stations => f.write_str("station list"),
            Self::Sensors => f.write_str("sensor list"),
            Self::SensorDefinitions => f.write_str("sensor definitions"),
            Self::PeriodOfRecord(sensor_id) => write!(f, "period of record of sensor {sensor_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    fetch_time: Duration,
    transient_failures: u16,
    backoff: ReconnectBackoff,
}

struct ActiveRun {
    job_id: JobId,
    cancellation: CancellationToken,
}

struct Shared {
    signals: Signals,
    config: RwLock<EngineConfig>,
    run: Mutex<Option<ActiveRun>>,
    total: AtomicUsize,
    completed: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

/// An in-process [`FetchEngine`].
///
/// Runs are executed on the tokio runtime the run was started from.
#[derive(Clone)]
pub struct SimulatedEngine {
    settings: Settings,
    shared: Arc<Shared>,
}

impl SimulatedEngine {
    pub fn new(signals: Signals) -> Self {
        Self {
            settings: Settings {
                fetch_time: Duration::from_millis(200),
                transient_failures: 0,
                backoff: ReconnectBackoff::DEFAULT,
            },
            shared: Arc::new(Shared {
                signals,
                config: RwLock::new(EngineConfig::default()),
                run: Mutex::new(None),
                total: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// How long each individual fetch takes.
    pub fn with_fetch_time(mut self, fetch_time: Duration) -> Self {
        self.settings.fetch_time = fetch_time;
        self
    }

    /// The number of connection attempts of every fetch that fail before one succeeds.
    pub fn with_transient_failures(mut self, failures: u16) -> Self {
        self.settings.transient_failures = failures;
        self
    }

    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.settings.backoff = backoff;
        self
    }

    fn config(&self) -> EngineConfig {
        self.shared
            .config
            .read()
            .map(|config| *config)
            .unwrap_or_default()
    }

    fn start_run(&self, job_id: JobId, fetches: Vec<Fetch>) -> Result<(), EngineError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        if fetches.is_empty() {
            return Err(EngineError::Rejected("Nothing to import".to_owned()));
        }
        let mut run = self
            .shared
            .run
            .lock()
            .map_err(|_| EngineError::Rejected("Fetch engine in bad state".to_owned()))?;
        if run.is_some() {
            return Err(EngineError::Busy);
        }

        let cancellation = CancellationToken::new();
        self.shared.total.store(fetches.len(), Ordering::SeqCst);
        self.shared.completed.store(0, Ordering::SeqCst);
        if let Ok(mut last_error) = self.shared.last_error.lock() {
            *last_error = None;
        }
        *run = Some(ActiveRun {
            job_id,
            cancellation: cancellation.clone(),
        });

        tracing::debug!(%job_id, fetches = fetches.len(), "Starting simulated import run");
        runtime.spawn(execute(
            self.shared.clone(),
            self.settings,
            self.config(),
            job_id,
            fetches,
            cancellation,
        ));
        Ok(())
    }
}

async fn execute(
    shared: Arc<Shared>,
    settings: Settings,
    config: EngineConfig,
    job_id: JobId,
    fetches: Vec<Fetch>,
    cancellation: CancellationToken,
) {
    let this = shared.as_ref();
    let run = stream::iter(fetches)
        .map(|fetch| async move {
            let result = fetch_with_retries(&fetch, settings, config.max_connection_retries).await;
            this.completed.fetch_add(1, Ordering::SeqCst);
            this.signals.progress_changed();
            result
        })
        .buffer_unordered(config.max_concurrency.max(1))
        .filter_map(|result| async { result.err() })
        .collect::<Vec<String>>();

    let outcome = tokio::select! {
        errors = run => match errors.is_empty() {
            true => RunOutcome::Succeeded,
            false => RunOutcome::failed(errors.join("; ")),
        },
        _ = cancellation.cancelled() => RunOutcome::failed(STOPPED_MESSAGE),
    };

    if let Ok(mut last_error) = this.last_error.lock() {
        *last_error = match &outcome {
            RunOutcome::Succeeded => None,
            RunOutcome::Failed { message } => Some(message.clone()),
        };
    }
    match this.run.lock() {
        Ok(mut run) => *run = None,
        Err(err) => tracing::error!(?err, %job_id, "Failed to release simulated run"),
    }
    tracing::debug!(%job_id, ?outcome, "Simulated import run finished");
    this.signals.run_finished(job_id, outcome);
}

async fn fetch_with_retries(
    fetch: &Fetch,
    settings: Settings,
    max_connection_retries: u16,
) -> Result<(), String> {
    let attempts = max_connection_retries.max(1);
    for attempt in 1..=attempts {
        tokio::time::sleep(settings.fetch_time).await;
        if attempt > settings.transient_failures {
            tracing::trace!(%fetch, attempt, "Fetched");
            return Ok(());
        }
        tracing::debug!(%fetch, attempt, "Connection to remote source failed");
        if attempt < attempts {
            tokio::time::sleep(settings.backoff.delay(attempt)).await;
        }
    }
    Err(format!(
        "Failed to fetch {fetch} after {attempts} connection attempts"
    ))
}

impl FetchEngine for SimulatedEngine {
    fn configure(&self, config: EngineConfig) {
        match self.shared.config.write() {
            Ok(mut current) => *current = config,
            Err(err) => tracing::error!(?err, "Failed to configure simulated engine"),
        }
    }

    fn is_busy(&self) -> bool {
        self.shared
            .run
            .lock()
            .map(|run| run.is_some())
            .unwrap_or(true)
    }

    fn progress(&self) -> Option<f64> {
        let total = self.shared.total.load(Ordering::SeqCst);
        let completed = self.shared.completed.load(Ordering::SeqCst);
        (total > 0).then(|| (completed as f64 / total as f64).min(1.0))
    }

    fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .ok()
            .and_then(|error| error.clone())
    }

    fn import_time_series(
        &self,
        job_id: JobId,
        range: &DateRange,
        sensors: &[SensorType],
    ) -> Result<(), EngineError> {
        let fetches = sensors
            .iter()
            .map(|sensor| Fetch::Series {
                sensor: *sensor,
                range: *range,
            })
            .collect();
        self.start_run(job_id, fetches)
    }

    fn import_station_sensors(&self, job_id: JobId) -> Result<(), EngineError> {
        self.start_run(
            job_id,
            vec![Fetch::Stations, Fetch::Sensors, Fetch::SensorDefinitions],
        )
    }

    fn import_period_of_record(
        &self,
        job_id: JobId,
        sensor_id: SensorId,
    ) -> Result<(), EngineError> {
        self.start_run(job_id, vec![Fetch::PeriodOfRecord(sensor_id)])
    }

    fn stop(&self) {
        if let Ok(run) = self.shared.run.lock() {
            if let Some(run) = run.as_ref() {
                tracing::info!(job_id = %run.job_id, "Stopping simulated import run");
                run.cancellation.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;
    use crate::engine::{signal_channel, EngineEvent, EventReceiver};

    async fn next_finished(events: &mut EventReceiver) -> (JobId, RunOutcome, usize) {
        let mut progress_events = 0;
        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Some(EngineEvent::ProgressChanged)) => progress_events += 1,
                Ok(Some(EngineEvent::RunFinished { job_id, outcome })) => {
                    return (job_id, outcome, progress_events)
                }
                Ok(None) => panic!("Event channel closed"),
                Err(_) => panic!("Timed out waiting for the run to finish"),
            }
        }
    }

    fn fast_backoff() -> ReconnectBackoff {
        ReconnectBackoff::exponential(Duration::from_millis(1))
    }

    fn sensor_id(id: i64) -> SensorId {
        id.try_into().unwrap()
    }

    #[tokio::test]
    async fn run_completes_and_reports_progress() {
        let (signals, mut events) = signal_channel();
        let engine = SimulatedEngine::new(signals).with_fetch_time(Duration::from_millis(1));
        let job_id = JobId::from(11);

        assert_eq!(engine.progress(), None);
        engine.import_station_sensors(job_id).unwrap();
        assert!(engine.is_busy());

        let (finished, outcome, progress_events) = next_finished(&mut events).await;
        assert_eq!(finished, job_id);
        assert_eq!(outcome, RunOutcome::Succeeded);
        assert_eq!(progress_events, 3);
        assert!(!engine.is_busy());
        assert_eq!(engine.progress(), Some(1.0));
        assert_eq!(engine.last_error(), None);
    }

    #[tokio::test]
    async fn rejects_second_run_while_busy() {
        let (signals, _events) = signal_channel();
        let engine = SimulatedEngine::new(signals).with_fetch_time(Duration::from_secs(10));

        engine
            .import_period_of_record(JobId::from(1), sensor_id(4))
            .unwrap();
        assert_matches!(
            engine.import_station_sensors(JobId::from(2)),
            Err(EngineError::Busy)
        );
        engine.stop();
    }

    #[tokio::test]
    async fn rejects_empty_sensor_selection() {
        let (signals, _events) = signal_channel();
        let engine = SimulatedEngine::new(signals);
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 31).unwrap(),
        )
        .unwrap();

        assert_matches!(
            engine.import_time_series(JobId::from(1), &range, &[]),
            Err(EngineError::Rejected(_))
        );
        assert!(!engine.is_busy());
    }

    #[test]
    fn requires_a_runtime() {
        let (signals, _events) = signal_channel();
        let engine = SimulatedEngine::new(signals);

        assert_matches!(
            engine.import_station_sensors(JobId::from(1)),
            Err(EngineError::NoRuntime)
        );
    }

    #[tokio::test]
    async fn retries_transient_connection_failures() {
        let (signals, mut events) = signal_channel();
        let engine = SimulatedEngine::new(signals)
            .with_fetch_time(Duration::from_millis(1))
            .with_transient_failures(2)
            .with_backoff(fast_backoff());

        engine
            .import_period_of_record(JobId::from(5), sensor_id(9))
            .unwrap();

        let (_, outcome, _) = next_finished(&mut events).await;
        assert_eq!(outcome, RunOutcome::Succeeded);
    }

    #[tokio::test]
    async fn fails_after_exhausting_connection_retries() {
        let (signals, mut events) = signal_channel();
        let engine = SimulatedEngine::new(signals)
            .with_fetch_time(Duration::from_millis(1))
            .with_transient_failures(10)
            .with_backoff(fast_backoff());
        engine.configure(EngineConfig::new().with_max_connection_retries(3));

        engine
            .import_period_of_record(JobId::from(5), sensor_id(9))
            .unwrap();

        let (_, outcome, _) = next_finished(&mut events).await;
        assert_matches!(
            outcome,
            RunOutcome::Failed { ref message } if message.contains("after 3 connection attempts")
        );
        assert_eq!(
            engine.last_error().as_deref(),
            match &outcome {
                RunOutcome::Failed { message } => Some(message.as_str()),
                RunOutcome::Succeeded => None,
            }
        );
    }

    #[tokio::test]
    async fn stop_finishes_run_as_failed() {
        let (signals, mut events) = signal_channel();
        let engine = SimulatedEngine::new(signals).with_fetch_time(Duration::from_secs(10));
        let job_id = JobId::from(8);

        engine.import_station_sensors(job_id).unwrap();
        engine.stop();

        let (finished, outcome, _) = next_finished(&mut events).await;
        assert_eq!(finished, job_id);
        assert_eq!(outcome, RunOutcome::failed(STOPPED_MESSAGE));
        assert!(!engine.is_busy());
    }
}
