//! Background job records for the backfill controller and reconciliation
//! scheduler (spec §3, §4.9, §4.10) — grounded on the teacher's in-memory
//! worker-task bookkeeping, generalized from a single task-log struct to
//! the two job shapes this pipeline tracks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::district::DistrictId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillStatus {
    Processing,
    Complete,
    Error,
}

/// Per-date counters for one backfill run (spec §3 `BackfillJob.progress`).
/// `current` names the date currently being fetched, cleared once the job
/// finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillProgress {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub current: Option<String>,
}

/// One backfill run over a single district's historical date range
/// (spec §3 `BackfillJob`, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillJob {
    pub id: Uuid,
    pub district_id: DistrictId,
    pub status: BackfillStatus,
    pub progress: BackfillProgress,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl BackfillJob {
    pub fn new(district_id: DistrictId, total_dates: usize) -> Self {
        BackfillJob {
            id: Uuid::new_v4(),
            district_id,
            status: BackfillStatus::Processing,
            progress: BackfillProgress {
                total: total_dates,
                ..Default::default()
            },
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn start_date(&mut self, date: &str) {
        self.progress.current = Some(date.to_string());
    }

    pub fn record_completed(&mut self) {
        self.progress.completed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.progress.skipped += 1;
    }

    pub fn record_unavailable(&mut self) {
        self.progress.unavailable += 1;
    }

    pub fn record_failed(&mut self) {
        self.progress.failed += 1;
    }

    /// Finalizes the job on its last date or on cancellation (spec §4.9:
    /// "finalized on last date or cancellation"). Reports `error` only when
    /// every date failed outright.
    pub fn finish(&mut self) {
        self.progress.current = None;
        self.status = if self.progress.failed > 0 && self.progress.failed == self.progress.total {
            self.error = Some(format!("all {} dates failed", self.progress.total));
            BackfillStatus::Error
        } else {
            BackfillStatus::Complete
        };
        self.completed_at = Some(chrono::Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, BackfillStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Pending,
    Initiated,
    Failed,
}

/// A scheduled recheck of a reporting month whose upstream data was
/// unavailable or incomplete at collection time (spec §3
/// `ScheduledReconciliation`, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReconciliation {
    pub district_id: DistrictId,
    pub target_month: String,
    pub scheduled_for: chrono::DateTime<chrono::Utc>,
    pub status: ReconciliationStatus,
    pub attempts: u32,
    pub last_attempt: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl ScheduledReconciliation {
    pub fn new(district_id: DistrictId, target_month: String, scheduled_for: chrono::DateTime<chrono::Utc>) -> Self {
        ScheduledReconciliation {
            district_id,
            target_month,
            scheduled_for,
            status: ReconciliationStatus::Pending,
            attempts: 0,
            last_attempt: None,
            error: None,
        }
    }

    /// Applies the spec §4.10 retry rule: below 3 attempts, reset to
    /// `pending` with `scheduled_for` pushed an hour out; otherwise mark
    /// `failed` for eventual GC.
    pub fn record_failure(&mut self, error: String, max_attempts: u32) {
        self.attempts += 1;
        self.last_attempt = Some(chrono::Utc::now());
        self.error = Some(error);
        if self.attempts < max_attempts {
            self.status = ReconciliationStatus::Pending;
            self.scheduled_for = chrono::Utc::now() + chrono::Duration::hours(1);
        } else {
            self.status = ReconciliationStatus::Failed;
        }
    }

    pub fn record_success(&mut self) {
        self.last_attempt = Some(chrono::Utc::now());
        self.status = ReconciliationStatus::Initiated;
        self.error = None;
    }

    pub fn is_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.status == ReconciliationStatus::Pending && self.scheduled_for <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn backfill_finish_reports_error_when_all_dates_failed() {
        let mut job = BackfillJob::new(DistrictId::from_str("42").unwrap(), 2);
        job.record_failed();
        job.record_failed();
        job.finish();
        assert_eq!(job.status, BackfillStatus::Error);
        assert!(job.is_terminal());
        assert!(job.error.is_some());
    }

    #[test]
    fn backfill_finish_reports_complete_on_partial_success() {
        let mut job = BackfillJob::new(DistrictId::from_str("42").unwrap(), 2);
        job.record_completed();
        job.record_failed();
        job.finish();
        assert_eq!(job.status, BackfillStatus::Complete);
        assert!(job.progress.current.is_none());
    }

    #[test]
    fn reconciliation_retries_then_fails_after_max_attempts() {
        let id = DistrictId::from_str("42").unwrap();
        let mut r = ScheduledReconciliation::new(id, "2024-06".into(), chrono::Utc::now());
        r.record_failure("upstream unavailable".into(), 3);
        assert_eq!(r.status, ReconciliationStatus::Pending);
        assert_eq!(r.attempts, 1);
        r.record_failure("upstream unavailable".into(), 3);
        r.record_failure("upstream unavailable".into(), 3);
        assert_eq!(r.status, ReconciliationStatus::Failed);
    }

    #[test]
    fn reconciliation_is_due_only_when_pending_and_scheduled_time_passed() {
        let id = DistrictId::from_str("42").unwrap();
        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        let r = ScheduledReconciliation::new(id, "2024-06".into(), past);
        assert!(r.is_due(chrono::Utc::now()));
    }
}
