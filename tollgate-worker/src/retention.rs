/// Audit log retention
///
/// Audit entries are append-only for application code; the only deletion
/// path is this job, which removes entries older than the retention horizon
/// across every account.
///
/// # Configuration
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `AUDIT_RETENTION_DAYS`: Horizon in days (default: 90)
/// - `RETENTION_INTERVAL_SECS`: Time between purges (default: 3600)
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use tollgate_shared::store::memory::MemoryStore;
/// use tollgate_worker::retention::RetentionJob;
///
/// # async fn example() {
/// let job = RetentionJob::new(Arc::new(MemoryStore::new()), 30);
/// let shutdown = CancellationToken::new();
///
/// let handle = tokio::spawn({
///     let shutdown = shutdown.clone();
///     async move { job.run(std::time::Duration::from_secs(3600), shutdown).await }
/// });
///
/// shutdown.cancel();
/// handle.await.unwrap();
/// # }
/// ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tollgate_shared::audit::{AuditLog, DEFAULT_MAX_PAGE_SIZE};
use tollgate_shared::store::postgres::DatabaseConfig;
use tollgate_shared::store::Store;
use tollgate_shared::GateResult;

pub const DEFAULT_RETENTION_DAYS: u32 = 90;
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub database: DatabaseConfig,
    pub retention_days: u32,
    pub interval_secs: u64,
}

impl RetentionConfig {
    /// Loads configuration from the environment (and `.env`)
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a numeric variable
    /// does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database = DatabaseConfig::from_env()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let retention_days = match env::var("AUDIT_RETENTION_DAYS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("AUDIT_RETENTION_DAYS must be a number of days"))?,
            Err(_) => DEFAULT_RETENTION_DAYS,
        };

        let interval_secs = match env::var("RETENTION_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("RETENTION_INTERVAL_SECS must be a number of seconds"))?,
            Err(_) => DEFAULT_INTERVAL_SECS,
        };

        Ok(Self {
            database,
            retention_days,
            interval_secs,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Periodic purge of expired audit entries
pub struct RetentionJob {
    audit: AuditLog,
    retention_days: u32,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn Store>, retention_days: u32) -> Self {
        Self {
            audit: AuditLog::new(store, DEFAULT_MAX_PAGE_SIZE),
            retention_days,
        }
    }

    /// Entries created strictly before this instant are purged
    pub fn cutoff_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Runs a single purge and returns the number of deleted entries
    pub async fn run_once(&self) -> GateResult<u64> {
        self.audit.purge_before(self.cutoff_at(Utc::now())).await
    }

    /// Purges every `every` until `shutdown` is cancelled
    ///
    /// A failed purge is logged and retried on the next tick.
    pub async fn run(&self, every: Duration, shutdown: CancellationToken) {
        tracing::info!(
            retention_days = self.retention_days,
            interval_secs = every.as_secs(),
            "Retention job starting"
        );

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, retention job stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(purged) => tracing::debug!(purged = purged, "Retention pass finished"),
                        Err(e) => tracing::error!(error = %e, "Retention pass failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tollgate_shared::models::audit::{AuditFilter, AuditLogEntry};
    use tollgate_shared::store::memory::MemoryStore;
    use tollgate_shared::store::AuditStore;
    use uuid::Uuid;

    async fn seed(store: &MemoryStore, account_id: Uuid, age_days: i64) {
        let mut entry = AuditLogEntry::new(account_id, "member.invited", "member", None, None, None);
        entry.created_at = Utc::now() - ChronoDuration::days(age_days);
        store.append_audit(entry).await.unwrap();
    }

    async fn remaining(store: &MemoryStore, account_id: Uuid) -> usize {
        let (items, _) = store
            .query_audit(account_id, &AuditFilter::default(), None)
            .await
            .unwrap();
        items.len()
    }

    #[test]
    fn test_cutoff() {
        let job = RetentionJob::new(Arc::new(MemoryStore::new()), 90);
        let now = Utc::now();
        assert_eq!(job.cutoff_at(now), now - ChronoDuration::days(90));
    }

    #[tokio::test]
    async fn test_run_once_purges_only_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        seed(&store, first, 120).await;
        seed(&store, first, 10).await;
        seed(&store, second, 91).await;
        seed(&store, second, 0).await;

        let job = RetentionJob::new(store.clone(), 90);
        assert_eq!(job.run_once().await.unwrap(), 2);

        assert_eq!(remaining(&store, first).await, 1);
        assert_eq!(remaining(&store, second).await, 1);

        assert_eq!(job.run_once().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let account_id = Uuid::new_v4();
        seed(&store, account_id, 365).await;

        let job = RetentionJob::new(store.clone(), 90);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { job.run(Duration::from_secs(60), shutdown).await }
        });

        // First tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remaining(&store, account_id).await, 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
