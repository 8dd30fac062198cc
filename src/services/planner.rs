use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;

use crate::db::{
    Booking, BookingRepository, CreateNotification, Notification, NotificationKind,
    NotificationRepository, BOOKING_CANCELLED,
};
use crate::error::{AppError, AppResult};
use crate::i18n;

async fn load_booking(pool: &SqlitePool, booking_id: i64) -> AppResult<Booking> {
    BookingRepository::find_by_id(pool, booking_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(i18n::t_with(
                "not_found.booking",
                &[("id", &booking_id.to_string())],
            ))
        })
}

/// When each lifecycle notification of a booking is due.
fn lifecycle_plan(booking: &Booking) -> [(NotificationKind, NaiveDateTime); 4] {
    [
        (NotificationKind::Booking24h, booking.start_time - Duration::hours(24)),
        (NotificationKind::Booking1h, booking.start_time - Duration::hours(1)),
        (NotificationKind::BookingStart, booking.start_time),
        (NotificationKind::BookingEnd, booking.end_time),
    ]
}

/// Create the PENDING lifecycle notifications of a confirmed booking.
///
/// Advance reminders whose time already passed are not created. Kinds that
/// already exist for the booking are left untouched, so calling this twice is
/// harmless. Returns only the rows created by this call.
pub async fn schedule_for_booking(
    pool: &SqlitePool,
    booking_id: i64,
    now: NaiveDateTime,
) -> AppResult<Vec<Notification>> {
    let booking = load_booking(pool, booking_id).await?;
    if booking.status == BOOKING_CANCELLED {
        return Err(AppError::Conflict(i18n::t_with(
            "conflict.booking_cancelled",
            &[("id", &booking_id.to_string())],
        )));
    }

    let mut created = Vec::new();
    for (kind, scheduled_at) in lifecycle_plan(&booking) {
        let advance = matches!(kind, NotificationKind::Booking24h | NotificationKind::Booking1h);
        if advance && scheduled_at < now {
            tracing::debug!(
                "Skipping {} for booking {}: already past at {}",
                kind.as_str(),
                booking.id,
                scheduled_at
            );
            continue;
        }

        let new = CreateNotification {
            kind,
            booking_id: booking.id,
            user_id: booking.user_id.clone(),
            scheduled_at,
        };
        if let Some(notification) = NotificationRepository::create(pool, new, now).await? {
            created.push(notification);
        }
    }

    tracing::info!(
        "Scheduled {} notification(s) for booking {}",
        created.len(),
        booking.id
    );
    Ok(created)
}

/// Cancel a booking and queue the cancellation notice for immediate delivery.
///
/// Pending reminders stay in place; the scheduler fails them with
/// "booking cancelled" once they come due.
pub async fn schedule_cancellation(
    pool: &SqlitePool,
    booking_id: i64,
    now: NaiveDateTime,
) -> AppResult<Option<Notification>> {
    let booking = load_booking(pool, booking_id).await?;

    if !BookingRepository::mark_cancelled(pool, booking.id, now).await? {
        tracing::debug!("Booking {} was already cancelled", booking.id);
    }

    let notification = NotificationRepository::create(
        pool,
        CreateNotification {
            kind: NotificationKind::BookingCancel,
            booking_id: booking.id,
            user_id: booking.user_id,
            scheduled_at: now,
        },
        now,
    )
    .await?;

    if notification.is_some() {
        tracing::info!("Cancellation notice queued for booking {}", booking_id);
    }
    Ok(notification)
}
