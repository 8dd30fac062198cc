//! Periodic sweep over due notifications.
//!
//! One sweep:
//!  - reclaims rows orphaned in PROCESSING by a crashed sweep,
//!  - re-queues retryable failures whose backoff elapsed (only when retry is enabled),
//!  - fetches up to `batch_size` due PENDING rows inside the lookback window, earliest first,
//!  - claims each row atomically, renders it, delivers it and records the outcome.
//!
//! A failure of one row never aborts the batch. Only a failing store query for
//! the sweep itself (reclaim, retry scan, fetch) aborts the tick.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::SchedulerConfig;
use crate::db::{BookingRepository, Notification, NotificationKind, NotificationRepository, UserRepository};
use crate::error::{AppResult, NotificationError};
use crate::services::delivery::{send_with_timeout, Notifier};
use crate::services::factory;

/// Counters of a single sweep, returned to the caller and logged.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub fetched: usize,
    pub claimed: usize,
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
    pub reclaimed: usize,
    pub requeued: usize,
}

enum Outcome {
    Sent,
    Failed,
    Skipped,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
}

impl NotificationScheduler {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>, config: SchedulerConfig) -> Self {
        Self {
            pool,
            notifier,
            config,
        }
    }

    pub async fn run_sweep(&self) -> AppResult<SweepReport> {
        self.run_sweep_at(Utc::now().naive_utc()).await
    }

    /// Run one sweep treating `now` as the current time for selection.
    ///
    /// Claim and completion timestamps always use the wall clock.
    pub async fn run_sweep_at(&self, now: NaiveDateTime) -> AppResult<SweepReport> {
        let mut report = SweepReport {
            reclaimed: self.reclaim_stuck(now).await?,
            ..Default::default()
        };

        if self.config.retry.enabled {
            report.requeued = self.requeue_retryable(now).await?;
        }

        let due = NotificationRepository::fetch_due(
            &self.pool,
            now,
            self.config.batch_size,
            self.config.lookback(),
        )
        .await?;
        report.fetched = due.len();

        for notification in due {
            if !notification.can_be_sent(now) {
                report.skipped += 1;
                continue;
            }

            match self.process(notification).await {
                Outcome::Sent => {
                    report.claimed += 1;
                    report.sent += 1;
                }
                Outcome::Failed => {
                    report.claimed += 1;
                    report.failed += 1;
                }
                Outcome::Skipped => report.skipped += 1,
            }
        }

        if report.fetched > 0 || report.reclaimed > 0 || report.requeued > 0 {
            tracing::info!(
                "Notification sweep finished: fetched={} sent={} failed={} skipped={} reclaimed={} requeued={}",
                report.fetched,
                report.sent,
                report.failed,
                report.skipped,
                report.reclaimed,
                report.requeued
            );
        } else {
            tracing::debug!("Notification sweep finished: nothing due");
        }

        Ok(report)
    }

    /// Fail PROCESSING rows whose claim is older than the stuck timeout.
    async fn reclaim_stuck(&self, now: NaiveDateTime) -> AppResult<usize> {
        let cutoff = now - self.config.stuck_timeout();
        let stuck =
            NotificationRepository::find_stuck(&self.pool, cutoff, self.config.batch_size).await?;

        let mut reclaimed = 0;
        for notification in stuck {
            let claimed_at = notification.claimed_at.unwrap_or(notification.updated_at);
            let err = NotificationError::StuckProcessing(claimed_at);
            let updated = NotificationRepository::mark_failed(
                &self.pool,
                notification.id,
                &err.to_string(),
                err.is_retryable(),
                Utc::now().naive_utc(),
            )
            .await?;

            if updated {
                tracing::warn!(
                    "Notification {} was stuck in processing since {}; marked failed",
                    notification.id,
                    claimed_at
                );
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    /// Put retryable failures back to PENDING once their backoff has elapsed.
    async fn requeue_retryable(&self, now: NaiveDateTime) -> AppResult<usize> {
        let retry = &self.config.retry;
        let candidates = NotificationRepository::find_retry_candidates(
            &self.pool,
            retry.max_attempts,
            self.config.batch_size,
        )
        .await?;

        let mut requeued = 0;
        for notification in candidates {
            let Some(failed_at) = notification.processed_at else {
                continue;
            };
            if failed_at + retry.backoff_for(notification.attempts) > now {
                continue;
            }

            if NotificationRepository::retry(&self.pool, notification.id, Utc::now().naive_utc())
                .await?
            {
                tracing::debug!(
                    "Notification {} re-queued for attempt {}",
                    notification.id,
                    notification.attempts + 1
                );
                requeued += 1;
            }
        }

        Ok(requeued)
    }

    async fn process(&self, notification: Notification) -> Outcome {
        let id = notification.id;

        match NotificationRepository::claim(&self.pool, id, Utc::now().naive_utc()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Notification {} already claimed elsewhere; skipping", id);
                return Outcome::Skipped;
            }
            Err(e) => {
                tracing::warn!("Failed to claim notification {}: {:?}", id, e);
                return Outcome::Skipped;
            }
        }

        let result = self.deliver(&notification).await;
        let finished_at = Utc::now().naive_utc();

        match result {
            Ok(message) => {
                match NotificationRepository::mark_sent(&self.pool, id, &message, finished_at).await
                {
                    Ok(true) => {
                        tracing::info!(
                            "Notification {} ({}) sent to user {}",
                            id,
                            notification.kind,
                            notification.user_id
                        );
                    }
                    Ok(false) => {
                        tracing::warn!(
                            "Notification {} was delivered but left processing before it could be marked sent",
                            id
                        );
                    }
                    Err(e) => {
                        // The row stays PROCESSING until the stuck reclaim picks it up.
                        tracing::error!(
                            "Notification {} was delivered but marking it sent failed: {:?}",
                            id,
                            e
                        );
                    }
                }
                Outcome::Sent
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(
                    "Notification {} ({}) for user {} failed: {}",
                    id,
                    notification.kind,
                    notification.user_id,
                    reason
                );

                if let Err(e) = NotificationRepository::mark_failed(
                    &self.pool,
                    id,
                    &reason,
                    err.is_retryable(),
                    finished_at,
                )
                .await
                {
                    tracing::error!("Failed to mark notification {} as failed: {:?}", id, e);
                }
                Outcome::Failed
            }
        }
    }

    /// Render and deliver one claimed notification, returning the sent text.
    async fn deliver(&self, notification: &Notification) -> Result<String, NotificationError> {
        let booking = BookingRepository::find_details(&self.pool, notification.booking_id)
            .await?
            .ok_or_else(|| NotificationError::BookingUnavailable("booking not found".to_string()))?;

        if booking.is_cancelled() && notification.kind() != Some(NotificationKind::BookingCancel) {
            return Err(NotificationError::BookingUnavailable(
                "booking cancelled".to_string(),
            ));
        }

        let lang = UserRepository::find_by_id(&self.pool, &notification.user_id)
            .await?
            .and_then(|user| user.lang);

        let message = factory::render(&notification.kind, &booking, lang.as_deref())?;

        send_with_timeout(
            self.notifier.as_ref(),
            &notification.user_id,
            &message,
            self.config.delivery_timeout(),
        )
        .await?;

        Ok(message)
    }
}
