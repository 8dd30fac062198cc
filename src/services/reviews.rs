//! Post-booking feedback requests.
//!
//! Bookings that ended more than `grace_minutes` ago and were not asked yet get
//! one feedback request. The `feedback_sent` flag is set only after a successful
//! dispatch. A failed dispatch is counted on the booking, which then waits
//! `retry_after_minutes` and yields its slot to untried bookings; after
//! `max_attempts` failures it is no longer selected.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::ReviewReminderConfig;
use crate::db::{BookingDetails, BookingRepository, UserRepository};
use crate::error::{AppResult, NotificationError};
use crate::services::delivery::{send_with_timeout, Notifier};
use crate::services::factory;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSweepReport {
    pub selected: usize,
    pub dispatched: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReviewReminderSweep {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    config: ReviewReminderConfig,
    delivery_timeout: Duration,
}

impl ReviewReminderSweep {
    pub fn new(
        pool: SqlitePool,
        notifier: Arc<dyn Notifier>,
        config: ReviewReminderConfig,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            notifier,
            config,
            delivery_timeout,
        }
    }

    pub async fn run_review_reminder_sweep(&self) -> AppResult<ReviewSweepReport> {
        self.run_at(Utc::now().naive_utc()).await
    }

    pub async fn run_at(&self, now: NaiveDateTime) -> AppResult<ReviewSweepReport> {
        let bookings = BookingRepository::find_awaiting_feedback(
            &self.pool,
            now - self.config.grace(),
            now - self.config.retry_after(),
            self.config.max_attempts,
            self.config.batch_size,
        )
        .await?;

        let mut report = ReviewSweepReport {
            selected: bookings.len(),
            ..Default::default()
        };

        for booking in bookings {
            match self.dispatch(&booking).await {
                Ok(()) => {
                    match BookingRepository::mark_feedback_sent(
                        &self.pool,
                        booking.id,
                        Utc::now().naive_utc(),
                    )
                    .await
                    {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!(
                            "Feedback flag for booking {} was already set",
                            booking.id
                        ),
                        Err(e) => tracing::error!(
                            "Feedback request for booking {} sent but flag update failed: {:?}",
                            booking.id,
                            e
                        ),
                    }
                    report.dispatched += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Feedback request for booking {} failed: {}",
                        booking.id,
                        e
                    );
                    report.failed += 1;
                    self.record_failure(booking.id, now).await;
                }
            }
        }

        if report.selected > 0 {
            tracing::info!(
                "Review reminder sweep finished: selected={} dispatched={} failed={}",
                report.selected,
                report.dispatched,
                report.failed
            );
        }

        Ok(report)
    }

    async fn record_failure(&self, booking_id: i64, now: NaiveDateTime) {
        match BookingRepository::record_feedback_failure(&self.pool, booking_id, now).await {
            Ok(Some(attempts)) if attempts >= self.config.max_attempts => tracing::warn!(
                "Giving up on feedback request for booking {} after {} attempts",
                booking_id,
                attempts
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(
                "Failed to record feedback failure for booking {}: {:?}",
                booking_id,
                e
            ),
        }
    }

    async fn dispatch(&self, booking: &BookingDetails) -> Result<(), NotificationError> {
        let lang = UserRepository::find_by_id(&self.pool, &booking.user_id)
            .await?
            .and_then(|user| user.lang);
        let message = factory::render_feedback_request(booking, lang.as_deref());

        send_with_timeout(
            self.notifier.as_ref(),
            &booking.user_id,
            &message,
            self.delivery_timeout,
        )
        .await
    }
}
