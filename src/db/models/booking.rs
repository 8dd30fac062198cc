use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const BOOKING_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub room_id: i64,
    pub user_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// 'confirmed' or 'cancelled'
    pub status: String,
    /// Whether a feedback request was already dispatched for this booking.
    pub feedback_sent: bool,
    /// Failed feedback dispatches so far.
    pub feedback_attempts: i32,
    pub feedback_last_attempt_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Booking snapshot joined with its room, used to render messages.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookingDetails {
    pub id: i64,
    pub user_id: String,
    pub room_name: String,
    pub room_address: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: String,
    pub feedback_sent: bool,
}

impl BookingDetails {
    pub fn is_cancelled(&self) -> bool {
        self.status == BOOKING_CANCELLED
    }
}
