//! Cron schedule parsing and next-fire computation.
//!
//! Operators write standard five-field crontab expressions
//! (`minute hour day-of-month month day-of-week`). The `cron` crate wants a
//! seconds field, so one is prefixed before parsing; it never appears in
//! stored or displayed expressions.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::CoreError;

/// A validated cron schedule.
///
/// Construction via [`CronSchedule::parse`] is the single validation point:
/// an instance of this type always yields fire times.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    inner: cron::Schedule,
}

impl CronSchedule {
    /// Parse and validate a five-field crontab expression.
    ///
    /// Rejects empty input, a field count other than five, and anything the
    /// cron parser refuses (out-of-range values, malformed steps, ...). The
    /// error message names the offending expression.
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation(
                "cron expression must not be empty".to_string(),
            ));
        }

        let field_count = trimmed.split_whitespace().count();
        if field_count != 5 {
            return Err(CoreError::Validation(format!(
                "cron expression '{trimmed}' has {field_count} fields, expected 5 \
                 (minute hour day-of-month month day-of-week)"
            )));
        }

        let with_seconds = format!("0 {trimmed}");
        let inner = cron::Schedule::from_str(&with_seconds).map_err(|e| {
            CoreError::Validation(format!("invalid cron expression '{trimmed}': {e}"))
        })?;

        Ok(Self {
            expr: trimmed.to_string(),
            inner,
        })
    }

    /// The five-field expression as the operator wrote it.
    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// The first fire time strictly after `after`.
    ///
    /// `None` only for schedules whose dates never recur again (e.g. an
    /// explicit year constraint in the past — unreachable through
    /// [`CronSchedule::parse`], which accepts no year field).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&after).next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
