use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use amora_domain::{
    config::{ConfigError, SweeperConfig},
    integrity::{BatchSelection, IntegrityError, IntegrityService},
    model::{BatchFixReport, IntegrityReport, WebhookEventRecord},
    services::telemetry::TelemetryError,
    storage::{IntegrityStore, ObjectStore, StorageError, WebhookEventStore},
};
use amora_storage::{ObjectStoreError, SeaOrmStorage};

/// Upper bound on failed webhook events listed per sweep.
pub const FAILED_EVENT_LIMIT: u64 = 200;

#[derive(Debug, Error)]
pub enum SweeperError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("object storage error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Outcome of a single sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub scan: IntegrityReport,
    /// Present only when auto-fix ran.
    pub fixes: Option<BatchFixReport>,
    pub failed_events: Vec<WebhookEventRecord>,
}

pub async fn run_sweeper(
    config: SweeperConfig,
    storage: SeaOrmStorage,
    objects: Option<Arc<dyn ObjectStore>>,
) -> Result<(), SweeperError> {
    if objects.is_none() {
        warn!("object storage not configured; gallery existence checks are skipped");
    }
    let integrity = IntegrityService::new(storage, objects);

    let Some(interval) = config.interval() else {
        sweep_once(&integrity, config.auto_fix()).await?;
        return Ok(());
    };

    info!(
        interval_secs = interval.as_secs(),
        auto_fix = config.auto_fix(),
        "sweeper running periodically"
    );
    loop {
        if let Err(err) = sweep_once(&integrity, config.auto_fix()).await {
            counter!("sweeper_runs_total", "result" => "error").increment(1);
            warn!(?err, "sweep failed");
        }
        sleep(interval).await;
    }
}

pub async fn sweep_once<S>(
    integrity: &IntegrityService<S>,
    auto_fix: bool,
) -> Result<SweepReport, SweeperError>
where
    S: IntegrityStore + WebhookEventStore,
{
    let started = Utc::now();
    let scan = integrity.scan(None).await?;
    let fixable = scan.issues.iter().filter(|issue| issue.auto_fixable).count();
    info!(
        total_users = scan.total_users,
        issues = scan.issues.len(),
        fixable,
        critical = scan.summary.critical,
        warning = scan.summary.warning,
        info = scan.summary.info,
        "integrity scan finished"
    );
    for (issue_type, count) in &scan.summary.by_type {
        info!(%issue_type, count, "issues by type");
    }
    gauge!("sweeper_open_issues").set(scan.issues.len() as f64);

    let fixes = if auto_fix && fixable > 0 {
        let report = integrity.fix_batch(&BatchSelection::everything()).await?;
        counter!("sweeper_fixes_total", "result" => "fixed").increment(report.fixed.len() as u64);
        counter!("sweeper_fixes_total", "result" => "failed").increment(report.failed.len() as u64);
        for item in &report.failed {
            warn!(
                user_id = %item.user_id,
                issue_type = %item.issue_type,
                message = %item.message,
                "auto-fix failed"
            );
        }
        info!(
            fixed = report.fixed.len(),
            failed = report.failed.len(),
            "auto-fix finished"
        );
        Some(report)
    } else {
        None
    };

    let failed_events = integrity.store().failed_events(FAILED_EVENT_LIMIT).await?;
    for event in &failed_events {
        warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            error = event.error.as_deref().unwrap_or("unknown"),
            received_at = %event.received_at,
            "webhook event needs manual reconciliation"
        );
    }
    gauge!("sweeper_failed_webhook_events").set(failed_events.len() as f64);

    let elapsed = (Utc::now() - started).num_milliseconds().max(0);
    histogram!("sweeper_run_duration_ms").record(elapsed as f64);
    counter!("sweeper_runs_total", "result" => "ok").increment(1);

    Ok(SweepReport {
        scan,
        fixes,
        failed_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use amora_domain::model::{IssueType, NewWebhookEvent, WebhookEventStatus};
    use amora_storage::testing::{memory_storage, seed_match, seed_profile, seed_user};
    use chrono::Duration;

    async fn seeded() -> SeaOrmStorage {
        let storage = memory_storage().await;
        for user in ["u1", "u2"] {
            seed_user(&storage, user, None, 0).await;
            seed_profile(&storage, user, Some("Sam"), Some("https://cdn.test/a.jpg")).await;
        }
        let now = Utc::now();
        seed_match(&storage, "m1", "u1", "u2", now - Duration::minutes(10)).await;
        seed_match(&storage, "m2", "u1", "u2", now).await;
        storage
    }

    fn count(report: &IntegrityReport, issue_type: IssueType) -> usize {
        report
            .issues
            .iter()
            .filter(|issue| issue.issue_type == issue_type)
            .count()
    }

    #[tokio::test]
    async fn report_only_sweep_leaves_data_untouched() {
        let integrity = IntegrityService::new(seeded().await, None);

        let first = sweep_once(&integrity, false).await.unwrap();
        assert!(first.fixes.is_none());
        assert_eq!(count(&first.scan, IssueType::DuplicateMatch), 1);

        let second = sweep_once(&integrity, false).await.unwrap();
        assert_eq!(count(&second.scan, IssueType::DuplicateMatch), 1);
    }

    #[tokio::test]
    async fn auto_fix_resolves_duplicate_matches() {
        let integrity = IntegrityService::new(seeded().await, None);

        let report = sweep_once(&integrity, true).await.unwrap();
        let fixes = report.fixes.expect("auto-fix ran");
        assert!(fixes
            .fixed
            .iter()
            .any(|item| item.issue_type == IssueType::DuplicateMatch));

        let after = sweep_once(&integrity, false).await.unwrap();
        assert_eq!(count(&after.scan, IssueType::DuplicateMatch), 0);
        assert_eq!(integrity.store().matches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_webhook_events_are_reported() {
        let storage = memory_storage().await;
        let now = Utc::now();
        for id in ["evt_ok", "evt_broken"] {
            storage
                .claim_event(NewWebhookEvent {
                    id: id.to_string(),
                    event_type: "invoice.paid".to_string(),
                    payload: serde_json::json!({ "id": id }).to_string(),
                    received_at: now,
                })
                .await
                .unwrap();
        }
        storage.mark_event_processed("evt_ok", now).await.unwrap();
        storage
            .mark_event_failed("evt_broken", "database unavailable", now)
            .await
            .unwrap();

        let integrity = IntegrityService::new(storage, None);
        let report = sweep_once(&integrity, true).await.unwrap();
        assert_eq!(report.failed_events.len(), 1);
        let failed = &report.failed_events[0];
        assert_eq!(failed.id, "evt_broken");
        assert_eq!(failed.status, WebhookEventStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("database unavailable"));
    }
}
