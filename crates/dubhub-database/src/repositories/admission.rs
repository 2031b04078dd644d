//! Admission ledger repository.

use chrono::Utc;
use sqlx::SqlitePool;

use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_entity::admission::{AdmissionDecision, IpAdmission};

/// Repository for the per-IP request ledger.
#[derive(Debug, Clone)]
pub struct AdmissionRepository {
    pool: SqlitePool,
}

impl AdmissionRepository {
    /// Create a new admission repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count one creation request from `ip` and decide whether it may proceed.
    ///
    /// A single upsert: the first request inserts `count = 1`; a blocked IP
    /// keeps its count; otherwise the count is incremented and the IP is
    /// blocked once it exceeds `max_allowed`. The `CASE` arms read the
    /// pre-update row, so the whole check is atomic per IP.
    pub async fn register(&self, ip: &str, max_allowed: i64) -> AppResult<AdmissionDecision> {
        let now = Utc::now();
        let (request_count, blocked): (i64, bool) = sqlx::query_as(
            "INSERT INTO ip_requests (ip, request_count, blocked, updated_at) VALUES (?, 1, 0, ?) \
             ON CONFLICT(ip) DO UPDATE SET \
                request_count = CASE WHEN blocked THEN request_count ELSE request_count + 1 END, \
                blocked = CASE WHEN blocked THEN 1 WHEN request_count + 1 > ? THEN 1 ELSE 0 END, \
                updated_at = ? \
             RETURNING request_count, blocked",
        )
        .bind(ip)
        .bind(now)
        .bind(max_allowed)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to register admission request", e)
        })?;

        Ok(AdmissionDecision {
            allowed: !blocked,
            total_count: request_count,
        })
    }

    /// Look up the ledger entry for `ip`.
    pub async fn find_by_ip(&self, ip: &str) -> AppResult<Option<IpAdmission>> {
        sqlx::query_as::<_, IpAdmission>("SELECT * FROM ip_requests WHERE ip = ?")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find admission record", e)
            })
    }

    /// All blocked IPs, most recently touched first.
    pub async fn list_blocked(&self) -> AppResult<Vec<IpAdmission>> {
        sqlx::query_as::<_, IpAdmission>(
            "SELECT * FROM ip_requests WHERE blocked = 1 ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list blocked IPs", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabasePool;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_fourteenth_request_is_denied_and_ban_sticks() {
        let db = test_db().await;
        let repo = AdmissionRepository::new(db.pool.pool().clone());

        for expected in 1..=13 {
            let decision = repo.register("203.0.113.7", 13).await.expect("register");
            assert!(decision.allowed, "request {expected} should pass");
            assert_eq!(decision.total_count, expected);
        }

        let denied = repo.register("203.0.113.7", 13).await.expect("register");
        assert!(!denied.allowed);
        assert_eq!(denied.total_count, 14);

        // Blocked IPs keep their count.
        let again = repo.register("203.0.113.7", 13).await.expect("register");
        assert!(!again.allowed);
        assert_eq!(again.total_count, 14);

        let other = repo.register("198.51.100.1", 13).await.expect("register");
        assert!(other.allowed);
        assert_eq!(other.total_count, 1);

        let blocked = repo.list_blocked().await.expect("list");
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_all_counted() {
        let db = test_db().await;
        let repo = AdmissionRepository::new(db.pool.pool().clone());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.register("192.0.2.1", 13).await.expect("register") })
            })
            .collect();

        let mut allowed = 0;
        for handle in futures::future::join_all(handles).await {
            if handle.expect("task").allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 13);

        let record = repo.find_by_ip("192.0.2.1").await.expect("find").expect("exists");
        assert!(record.blocked);
        assert_eq!(record.request_count, 14);
    }

    #[tokio::test]
    async fn test_ban_survives_restart() {
        let db = test_db().await;
        let repo = AdmissionRepository::new(db.pool.pool().clone());
        for _ in 0..3 {
            repo.register("192.0.2.50", 2).await.expect("register");
        }
        db.pool.close().await;

        let reopened = DatabasePool::connect(&db.config).await.expect("reconnect");
        let repo = AdmissionRepository::new(reopened.pool().clone());
        let decision = repo.register("192.0.2.50", 2).await.expect("register");
        assert!(!decision.allowed);
        assert_eq!(decision.total_count, 3);
    }
}
