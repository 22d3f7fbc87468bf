use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use import_scheduler::prelude::*;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,import_scheduler=debug")),
        )
        .init();

    let (signals, events) = engine::signal_channel();
    let engine = SimulatedEngine::new(signals)
        .with_fetch_time(Duration::from_millis(150))
        .with_transient_failures(1);
    let config = SchedulerConfig::new()
        .with_max_history(Some(20))
        .with_engine(EngineConfig::new().with_max_concurrency(3));
    let scheduler = Arc::new(ImportScheduler::with_config(engine, config));
    let listener = scheduler.spawn_listener(events);

    let job_id = scheduler.submit_station_sensor_snapshot().unwrap();
    println!("Submitted {job_id}");
    let job_id = scheduler
        .submit_time_series_range(
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 31).unwrap(),
            SensorType::DAILY,
        )
        .unwrap();
    println!("Submitted {job_id}");
    let job_id = scheduler.submit_daily_days(None, Some(30)).unwrap();
    println!("Submitted {job_id}");
    let job_id = scheduler.submit_seasonal_forecast_range(None, Some(2)).unwrap();
    println!("Submitted {job_id}");
    for job_id in scheduler.submit_period_of_record_batch([4, 8, 15]).unwrap() {
        println!("Submitted {job_id}");
    }

    if let Err(err) = scheduler.submit_period_of_record(-5) {
        println!("Rejected request: {err}");
    }

    loop {
        let snapshot = scheduler.status_snapshot().unwrap();
        println!("{}", snapshot.to_json().unwrap());
        if snapshot.is_idle() {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    listener.graceful_shutdown().await.unwrap();
}
