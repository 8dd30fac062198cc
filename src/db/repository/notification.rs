use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;

use crate::db::models::{CreateNotification, Notification};
use crate::error::{AppError, AppResult};

const NOTIFICATION_COLUMNS: &str = r#"
    id,
    kind,
    status,
    booking_id,
    user_id,
    scheduled_at,
    processed_at,
    message,
    error,
    attempts,
    retryable,
    claimed_at,
    created_at,
    updated_at
"#;

/// Optional filters for the operator listing.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub status: Option<String>,
    pub booking_id: Option<i64>,
}

/// Repository for scheduled booking notifications.
///
/// Implementation notes:
/// - Every status change is a single conditional `UPDATE ... WHERE id = ? AND status = ?`
///   so that a transition only happens from the expected state. Callers inspect the
///   returned flag (affected rows == 1) instead of trusting a previously read row.
/// - Each statement writes all fields of the target state at once, clearing the
///   ones that belong to other states, so readers never see partial transitions.
pub struct NotificationRepository;

impl NotificationRepository {
    /// Insert a PENDING notification. Returns `None` when a notification of the
    /// same kind already exists for the booking.
    pub async fn create(
        pool: &SqlitePool,
        new: CreateNotification,
        now: NaiveDateTime,
    ) -> AppResult<Option<Notification>> {
        let sql = format!(
            r#"
            INSERT INTO notifications (
                kind, status, booking_id, user_id, scheduled_at, created_at, updated_at
            ) VALUES (?, 'pending', ?, ?, ?, ?, ?)
            ON CONFLICT (booking_id, kind) DO NOTHING
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(new.kind.as_str())
            .bind(new.booking_id)
            .bind(new.user_id)
            .bind(new.scheduled_at)
            .bind(now)
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Notification>> {
        let sql = format!("SELECT {} FROM notifications WHERE id = ?", NOTIFICATION_COLUMNS);

        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Due PENDING notifications inside the lookback window, earliest first.
    ///
    /// Rows whose `scheduled_at` is older than `now - lookback` are never returned
    /// even while still PENDING.
    pub async fn fetch_due(
        pool: &SqlitePool,
        now: NaiveDateTime,
        batch_size: i64,
        lookback: Duration,
    ) -> AppResult<Vec<Notification>> {
        if batch_size <= 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE status = 'pending'
              AND scheduled_at <= ?
              AND scheduled_at >= ?
            ORDER BY scheduled_at ASC, id ASC
            LIMIT ?
            "#,
            NOTIFICATION_COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(now)
            .bind(now - lookback)
            .bind(batch_size)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Atomically move a row from PENDING to PROCESSING.
    ///
    /// Returns `false` when the row is no longer PENDING (another sweep claimed it).
    pub async fn claim(pool: &SqlitePool, id: i64, now: NaiveDateTime) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'processing',
                claimed_at = ?,
                attempts = attempts + 1,
                message = NULL,
                error = NULL,
                retryable = 0,
                updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// PROCESSING -> SENT.
    pub async fn mark_sent(
        pool: &SqlitePool,
        id: i64,
        message: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'sent',
                processed_at = ?,
                message = ?,
                error = NULL,
                retryable = 0,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(now)
        .bind(message)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// PROCESSING -> FAILED.
    pub async fn mark_failed(
        pool: &SqlitePool,
        id: i64,
        error: &str,
        retryable: bool,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed',
                processed_at = ?,
                message = NULL,
                error = ?,
                retryable = ?,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(now)
        .bind(error)
        .bind(retryable)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// PROCESSING rows claimed at or before `claimed_before`.
    pub async fn find_stuck(
        pool: &SqlitePool,
        claimed_before: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE status = 'processing'
              AND claimed_at IS NOT NULL
              AND claimed_at <= ?
            ORDER BY claimed_at ASC
            LIMIT ?
            "#,
            NOTIFICATION_COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(claimed_before)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// FAILED rows that the retry pass may reconsider, oldest failure first.
    pub async fn find_retry_candidates(
        pool: &SqlitePool,
        max_attempts: i32,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE status = 'failed'
              AND retryable = 1
              AND attempts < ?
            ORDER BY processed_at ASC
            LIMIT ?
            "#,
            NOTIFICATION_COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Retry pass: retryable FAILED -> PENDING.
    pub async fn retry(pool: &SqlitePool, id: i64, now: NaiveDateTime) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'pending',
                processed_at = NULL,
                error = NULL,
                retryable = 0,
                updated_at = ?
            WHERE id = ? AND status = 'failed' AND retryable = 1
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Operator re-queue: any FAILED row -> PENDING.
    ///
    /// The row keeps its original `scheduled_at`, so it is only picked up again
    /// while still inside the lookback window.
    pub async fn requeue(pool: &SqlitePool, id: i64, now: NaiveDateTime) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'pending',
                processed_at = NULL,
                error = NULL,
                retryable = 0,
                updated_at = ?
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &NotificationFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR booking_id = ?)
            ORDER BY scheduled_at DESC, id DESC
            LIMIT ?
            OFFSET ?
            "#,
            NOTIFICATION_COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(filter.status.as_deref())
            .bind(filter.status.as_deref())
            .bind(filter.booking_id)
            .bind(filter.booking_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn count(pool: &SqlitePool, filter: &NotificationFilter) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR booking_id = ?)
            "#,
        )
        .bind(filter.status.as_deref())
        .bind(filter.status.as_deref())
        .bind(filter.booking_id)
        .bind(filter.booking_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count)
    }

    /// Counts grouped by status
    pub async fn counts_by_status(pool: &SqlitePool) -> AppResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM notifications
            GROUP BY status
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().collect())
    }
}
