use serde::Serialize;

use crate::{job::Job, SchedulerError};

/// A point in time copy of the scheduler's jobs.
///
/// Serializes to the shape polled by clients, omitting empty collections:
///
/// ```text
/// { "requests": [..], "executing": {..}, "history": [..] }
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    /// Pending jobs in the order they will start.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executing: Option<Job>,
    /// Finished jobs, newest first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Job>,
}

impl StatusSnapshot {
    /// Whether no job is pending or executing.
    pub fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.executing.is_none()
    }

    pub fn to_json(&self) -> Result<String, SchedulerError> {
        Ok(serde_json::to_string(self)?)
    }
}
