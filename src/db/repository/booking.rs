use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::{Booking, BookingDetails};
use crate::error::{AppError, AppResult};

const BOOKING_DETAILS_SELECT: &str = r#"
    SELECT
        b.id,
        b.user_id,
        r.name AS room_name,
        r.address AS room_address,
        b.start_time,
        b.end_time,
        b.status,
        b.feedback_sent
    FROM bookings b
    JOIN rooms r ON r.id = b.room_id
"#;

// ============================================================================
// Booking Repository
// ============================================================================

/// Read access to bookings plus the two flags this service owns:
/// `feedback_sent` and the cancellation status.
pub struct BookingRepository;

impl BookingRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT
                id, room_id, user_id, start_time, end_time,
                status, feedback_sent, feedback_attempts, feedback_last_attempt_at,
                created_at, updated_at
            FROM bookings
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_details(pool: &SqlitePool, id: i64) -> AppResult<Option<BookingDetails>> {
        let sql = format!("{} WHERE b.id = ?", BOOKING_DETAILS_SELECT);

        sqlx::query_as::<_, BookingDetails>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Confirmed bookings that ended at or before `ended_before` and still await a
    /// feedback request. Bookings that failed `max_attempts` times are dropped and
    /// a failed booking waits until its last attempt is older than `retry_before`.
    /// Fewest attempts first, then oldest.
    pub async fn find_awaiting_feedback(
        pool: &SqlitePool,
        ended_before: NaiveDateTime,
        retry_before: NaiveDateTime,
        max_attempts: i32,
        limit: i64,
    ) -> AppResult<Vec<BookingDetails>> {
        let sql = format!(
            r#"
            {}
            WHERE b.end_time <= ?
              AND b.feedback_sent = 0
              AND b.status != 'cancelled'
              AND b.feedback_attempts < ?
              AND (b.feedback_last_attempt_at IS NULL OR b.feedback_last_attempt_at <= ?)
            ORDER BY b.feedback_attempts ASC, b.end_time ASC, b.id ASC
            LIMIT ?
            "#,
            BOOKING_DETAILS_SELECT
        );

        sqlx::query_as::<_, BookingDetails>(&sql)
            .bind(ended_before)
            .bind(max_attempts)
            .bind(retry_before)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Count a failed feedback dispatch. Returns the attempts so far, or `None`
    /// when the booking is gone or was flagged meanwhile.
    pub async fn record_feedback_failure(
        pool: &SqlitePool,
        id: i64,
        now: NaiveDateTime,
    ) -> AppResult<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE bookings
            SET feedback_attempts = feedback_attempts + 1,
                feedback_last_attempt_at = ?,
                updated_at = ?
            WHERE id = ? AND feedback_sent = 0
            RETURNING feedback_attempts
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Set `feedback_sent`. Returns `false` when the flag was already set.
    pub async fn mark_feedback_sent(
        pool: &SqlitePool,
        id: i64,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET feedback_sent = 1, updated_at = ?
            WHERE id = ? AND feedback_sent = 0
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark a booking cancelled. Returns `false` when it already was.
    pub async fn mark_cancelled(pool: &SqlitePool, id: i64, now: NaiveDateTime) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'cancelled', updated_at = ?
            WHERE id = ? AND status != 'cancelled'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_booking, insert_room, insert_user, test_pool};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn details_join_room() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();
        let user = insert_user(&pool, "Ilya", None).await;
        let room = insert_room(&pool, "Conference A").await;
        let booking = insert_booking(&pool, room, &user, now, now + Duration::hours(1)).await;

        let details = BookingRepository::find_details(&pool, booking).await.unwrap().unwrap();
        assert_eq!(details.room_name, "Conference A");
        assert_eq!(details.room_address.as_deref(), Some("Main street 1"));
        assert_eq!(details.user_id, user);
        assert!(!details.is_cancelled());
        assert!(BookingRepository::find_details(&pool, booking + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn awaiting_feedback_excludes_flagged_cancelled_and_recent() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();
        let user = insert_user(&pool, "Kira", None).await;
        let room = insert_room(&pool, "Atelier").await;
        let cutoff = now - Duration::minutes(15);

        let eligible = insert_booking(&pool, room, &user, now - Duration::hours(2), now - Duration::minutes(20)).await;
        let recent = insert_booking(&pool, room, &user, now - Duration::hours(1), now - Duration::minutes(5)).await;
        let flagged = insert_booking(&pool, room, &user, now - Duration::hours(3), now - Duration::hours(2)).await;
        let cancelled = insert_booking(&pool, room, &user, now - Duration::hours(4), now - Duration::hours(3)).await;
        assert!(BookingRepository::mark_feedback_sent(&pool, flagged, now).await.unwrap());
        assert!(BookingRepository::mark_cancelled(&pool, cancelled, now).await.unwrap());
        assert!(!BookingRepository::mark_cancelled(&pool, cancelled, now).await.unwrap());

        let found = BookingRepository::find_awaiting_feedback(&pool, cutoff, now, 5, 50)
            .await
            .unwrap();
        let ids: Vec<i64> = found.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![eligible]);
        assert!(!ids.contains(&recent));

        assert!(!BookingRepository::mark_feedback_sent(&pool, flagged, now).await.unwrap());
    }

    #[tokio::test]
    async fn failed_feedback_backs_off_and_gives_up() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();
        let user = insert_user(&pool, "Lev", None).await;
        let room = insert_room(&pool, "Annex").await;
        let cutoff = now - Duration::minutes(15);

        let old = insert_booking(&pool, room, &user, now - Duration::hours(5), now - Duration::hours(4)).await;
        let newer = insert_booking(&pool, room, &user, now - Duration::hours(2), now - Duration::hours(1)).await;

        assert_eq!(
            BookingRepository::record_feedback_failure(&pool, old, now).await.unwrap(),
            Some(1)
        );

        // inside the back-off window only the untried booking is eligible
        let found = BookingRepository::find_awaiting_feedback(&pool, cutoff, now - Duration::hours(1), 3, 50)
            .await
            .unwrap();
        assert_eq!(found.iter().map(|b| b.id).collect::<Vec<_>>(), vec![newer]);

        // once the window passed, untried bookings still come first
        let later = now + Duration::hours(2);
        let found = BookingRepository::find_awaiting_feedback(&pool, cutoff, later - Duration::hours(1), 3, 50)
            .await
            .unwrap();
        assert_eq!(found.iter().map(|b| b.id).collect::<Vec<_>>(), vec![newer, old]);

        BookingRepository::record_feedback_failure(&pool, old, later).await.unwrap();
        assert_eq!(
            BookingRepository::record_feedback_failure(&pool, old, later).await.unwrap(),
            Some(3)
        );
        let found = BookingRepository::find_awaiting_feedback(&pool, cutoff, later, 3, 50)
            .await
            .unwrap();
        assert_eq!(found.iter().map(|b| b.id).collect::<Vec<_>>(), vec![newer]);

        let stored = BookingRepository::find_by_id(&pool, old).await.unwrap().unwrap();
        assert_eq!(stored.feedback_attempts, 3);
        assert_eq!(stored.feedback_last_attempt_at, Some(later));

        assert!(BookingRepository::mark_feedback_sent(&pool, newer, now).await.unwrap());
        assert_eq!(
            BookingRepository::record_feedback_failure(&pool, newer, now).await.unwrap(),
            None
        );
    }
}
