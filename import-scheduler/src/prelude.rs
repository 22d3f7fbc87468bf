//! The purpose of this module is to alleviate the need to import many of the `[import_scheduler]`
//! types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use import_scheduler::prelude::*;
//! ```
pub use crate::config::SchedulerConfig;
pub use crate::engine;
pub use crate::engine::backoff::{Jitter, ReconnectBackoff};
pub use crate::engine::simulated::SimulatedEngine;
pub use crate::engine::{EngineConfig, EngineError, EngineEvent, FetchEngine, RunOutcome};
pub use crate::job::range::DateRange;
pub use crate::job::{InvalidRequest, Job, JobId, JobKind, JobStatus};
pub use crate::scheduler::listener::ListenerHandle;
pub use crate::scheduler::snapshot::StatusSnapshot;
pub use crate::sensor::SensorType;
pub use crate::ImportScheduler;
pub use crate::SchedulerError;
