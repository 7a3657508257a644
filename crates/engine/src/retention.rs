//! Retention sweep for view facts.

use chrono::{DateTime, Duration, Utc};
use interlude_core::clock::Clock;
use interlude_core::{InterludeError, InterludeResult};
use interlude_store::ViewStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub days: u32,
    pub cutoff: DateTime<Utc>,
    /// Facts older than the cutoff.
    pub matched: usize,
    pub deleted: usize,
    pub dry_run: bool,
}

pub struct RetentionSweeper {
    views: Arc<dyn ViewStore>,
    clock: Arc<dyn Clock>,
}

impl RetentionSweeper {
    pub fn new(views: Arc<dyn ViewStore>, clock: Arc<dyn Clock>) -> Self {
        Self { views, clock }
    }

    /// Delete view facts with `viewed_at` more than `days` days ago. A dry
    /// run only counts them. A window reaching past the earliest
    /// representable date is a validation error.
    pub fn sweep(&self, days: u32, dry_run: bool) -> InterludeResult<SweepReport> {
        let cutoff = Duration::try_days(i64::from(days))
            .and_then(|window| self.clock.now().checked_sub_signed(window))
            .ok_or_else(|| {
                InterludeError::Validation(format!(
                    "retention of {days} days reaches before the earliest representable date"
                ))
            })?;
        let matched = self.views.count_views_before(cutoff)?;
        let deleted = if dry_run || matched == 0 {
            0
        } else {
            self.views.delete_views_before(cutoff)?
        };

        info!(days, %cutoff, matched, deleted, dry_run, "Retention sweep finished");
        Ok(SweepReport {
            days,
            cutoff,
            matched,
            deleted,
            dry_run,
        })
    }
}
