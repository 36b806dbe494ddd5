//! Month-end reconciliation retries until the upstream dashboard stabilizes
//! (spec §4.10) — grounded on the same `WorkerTask`-registry idiom as the
//! [`crate::backfill_controller`], generalized from a per-date job table to
//! a `(districtId, targetMonth)`-keyed retry map ticked on a fixed
//! interval rather than driven by per-job background loops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use district_report_types::{DistrictId, ReconciliationStatus, ScheduledReconciliation};

use crate::config::PipelineConfig;

/// Performs the actual reconciliation for one district/month once it comes
/// due; kept as a capability interface so the scheduler doesn't depend on
/// the concrete [`crate::backfill_controller::BackfillController`] (spec
/// §9: "cross-cutting interfaces remain capability interfaces").
#[async_trait]
pub trait ReconciliationOrchestrator: Send + Sync {
    async fn reconcile(&self, district_id: &DistrictId, target_month: &str) -> Result<(), Error>;
}

pub struct ReconciliationScheduler<O> {
    orchestrator: Arc<O>,
    configured_districts: Vec<DistrictId>,
    config: PipelineConfig,
    entries: Mutex<HashMap<(DistrictId, String), ScheduledReconciliation>>,
}

fn previous_month(now: chrono::DateTime<Utc>) -> String {
    let (year, month) = if now.month() == 1 { (now.year() - 1, 12) } else { (now.year(), now.month() - 1) };
    format!("{year:04}-{month:02}")
}

impl<O: ReconciliationOrchestrator + 'static> ReconciliationScheduler<O> {
    pub fn new(orchestrator: Arc<O>, configured_districts: Vec<DistrictId>, config: PipelineConfig) -> Self {
        ReconciliationScheduler {
            orchestrator,
            configured_districts,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one scheduling + retry pass (spec §4.10 (a) and (b)). Exposed
    /// separately from [`Self::spawn`] so tests can drive it without
    /// waiting on the real interval.
    pub async fn tick(&self) {
        let now = Utc::now();
        if now.day() <= 5 {
            self.schedule_previous_month(now).await;
        }
        self.process_due(now).await;
        self.gc_expired(now).await;
    }

    async fn schedule_previous_month(&self, now: chrono::DateTime<Utc>) {
        let target_month = previous_month(now);
        let mut entries = self.entries.lock().await;
        for district_id in &self.configured_districts {
            let key = (district_id.clone(), target_month.clone());
            if entries.contains_key(&key) {
                continue;
            }
            entries.insert(key, ScheduledReconciliation::new(district_id.clone(), target_month.clone(), now));
        }
    }

    async fn process_due(&self, now: chrono::DateTime<Utc>) {
        let due_keys: Vec<(DistrictId, String)> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|(_, entry)| entry.is_due(now))
                .map(|(key, _)| key.clone())
                .collect()
        };

        for key in due_keys {
            let result = self.orchestrator.reconcile(&key.0, &key.1).await;
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(&key) {
                match result {
                    Ok(()) => entry.record_success(),
                    Err(err) => entry.record_failure(err.to_string(), self.config.max_reconciliation_attempts),
                }
            }
        }
    }

    async fn gc_expired(&self, now: chrono::DateTime<Utc>) {
        let max_age = chrono::Duration::seconds(self.config.reconciliation_gc_age_seconds as i64);
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| {
            let terminal = matches!(entry.status, ReconciliationStatus::Initiated | ReconciliationStatus::Failed);
            if !terminal {
                return true;
            }
            match entry.last_attempt {
                Some(last) => now - last < max_age,
                None => true,
            }
        });
    }

    pub async fn entries_snapshot(&self) -> Vec<ScheduledReconciliation> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Runs [`Self::tick`] on a fixed interval until the returned handle is
    /// dropped or aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.reconciliation_interval_minutes * 60);
        tokio::spawn(async move {
            loop {
                self.tick().await;
                tokio::time::sleep(interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyOrchestrator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReconciliationOrchestrator for FlakyOrchestrator {
        async fn reconcile(&self, _district_id: &DistrictId, _target_month: &str) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("upstream not ready")
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            cache_dir: "/tmp/district-reports-test".into(),
            snapshot_dir: None,
            time_series_dir: None,
            configured_districts: vec!["42".to_string()],
            integrity_size_tolerance_bytes: 100,
            reconciliation_member_threshold: 100,
            aggregator_cache_capacity: 50,
            aggregator_cache_ttl_seconds: 300,
            reconciliation_interval_minutes: 60,
            backfill_inter_date_delay_ms: 2000,
            max_reconciliation_attempts: 3,
            backfill_job_gc_age_seconds: 3600,
            reconciliation_gc_age_seconds: 86_400,
        }
    }

    #[tokio::test]
    async fn auto_schedules_previous_month_when_day_is_early() {
        let orchestrator = Arc::new(FlakyOrchestrator { calls: AtomicUsize::new(0) });
        let districts = vec![DistrictId::from_str("42").unwrap()];
        let scheduler = ReconciliationScheduler::new(orchestrator, districts, test_config());

        let now = Utc::now();
        scheduler.schedule_previous_month(now).await;
        let entries = scheduler.entries_snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target_month, previous_month(now));
        assert_eq!(entries[0].status, ReconciliationStatus::Pending);

        // Scheduling twice for the same month must not duplicate the entry.
        scheduler.schedule_previous_month(now).await;
        assert_eq!(scheduler.entries_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn retries_then_marks_failed_after_max_attempts() {
        let orchestrator = Arc::new(FlakyOrchestrator { calls: AtomicUsize::new(0) });
        let districts = vec![DistrictId::from_str("42").unwrap()];
        let scheduler = ReconciliationScheduler::new(orchestrator, districts, test_config());

        let now = Utc::now();
        scheduler.schedule_previous_month(now).await;

        for _ in 0..3 {
            let mut entries = scheduler.entries.lock().await;
            for entry in entries.values_mut() {
                entry.scheduled_for = now;
            }
            drop(entries);
            scheduler.process_due(now).await;
        }

        let entries = scheduler.entries_snapshot().await;
        assert_eq!(entries[0].status, ReconciliationStatus::Failed);
        assert_eq!(entries[0].attempts, 3);
    }
}
