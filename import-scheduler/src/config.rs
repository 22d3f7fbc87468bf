//! The API for configuring an [`crate::scheduler::ImportScheduler`].
//!
//! # Example
//!
//! To keep only the 50 most recent finished jobs and default daily imports to a month, while
//! limiting the fetch engine to two concurrent fetches:
//!
//! ```
//! # use import_scheduler::prelude::*;
//! let config = SchedulerConfig::new()
//!     .with_default_import_days(30)
//!     .with_max_history(Some(50))
//!     .with_engine(EngineConfig::new().with_max_concurrency(2));
//!
//! assert_eq!(config.default_import_days(), 30);
//! assert_eq!(config.engine().max_concurrency, 2);
//! ```
use chrono::{FixedOffset, NaiveDate, Offset, Utc};

use crate::engine::EngineConfig;

/// Offset of Pacific Standard Time, the zone of the remote data source.
const PST_OFFSET_SECONDS: i32 = 8 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    default_import_days: u32,
    default_import_months: u32,
    max_history: Option<usize>,
    utc_offset: FixedOffset,
    engine: EngineConfig,
}

impl SchedulerConfig {
    pub const DEFAULT_IMPORT_DAYS: u32 = 60;
    pub const DEFAULT_IMPORT_MONTHS: u32 = 6;

    pub fn new() -> Self {
        Self {
            default_import_days: Self::DEFAULT_IMPORT_DAYS,
            default_import_months: Self::DEFAULT_IMPORT_MONTHS,
            max_history: None,
            utc_offset: FixedOffset::west_opt(PST_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix()),
            engine: EngineConfig::new(),
        }
    }

    /// The number of days imported by daily submissions without a usable start or day count.
    pub fn with_default_import_days(mut self, days: u32) -> Self {
        self.default_import_days = days;
        self
    }

    /// The number of months imported by monthly submissions without a usable start or month count.
    pub fn with_default_import_months(mut self, months: u32) -> Self {
        self.default_import_months = months;
        self
    }

    /// Keep at most `limit` finished jobs, dropping the oldest. `None` keeps all of them.
    pub fn with_max_history(mut self, limit: Option<usize>) -> Self {
        self.max_history = limit;
        self
    }

    /// The offset used to determine the current date and water year.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn default_import_days(&self) -> u32 {
        self.default_import_days
    }

    pub fn default_import_months(&self) -> u32 {
        self.default_import_months
    }

    pub fn max_history(&self) -> Option<usize> {
        self.max_history
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn engine(&self) -> EngineConfig {
        self.engine
    }

    pub(crate) fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
