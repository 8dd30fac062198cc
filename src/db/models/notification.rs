use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Booking lifecycle moment a notification is tied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booking24h,
    Booking1h,
    BookingStart,
    BookingEnd,
    BookingCancel,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::Booking24h,
        NotificationKind::Booking1h,
        NotificationKind::BookingStart,
        NotificationKind::BookingEnd,
        NotificationKind::BookingCancel,
    ];

    /// Parse the stored representation. Unknown values return `None`.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Booking24h => "booking_24h",
            NotificationKind::Booking1h => "booking_1h",
            NotificationKind::BookingStart => "booking_start",
            NotificationKind::BookingEnd => "booking_end",
            NotificationKind::BookingCancel => "booking_cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(NotificationStatus::Pending),
            "processing" => Some(NotificationStatus::Processing),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Processing => "processing",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

/// A scheduled booking notification and its processing state.
///
/// `kind` and `status` are kept as stored text: a row may carry a kind this
/// build does not know, which the factory rejects as `UnsupportedKind`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub booking_id: i64,
    pub user_id: String,
    pub scheduled_at: NaiveDateTime,
    /// Set on the terminal transition (SENT or FAILED) only.
    pub processed_at: Option<NaiveDateTime>,
    /// Rendered text, present only when SENT.
    pub message: Option<String>,
    /// Failure reason, present only when FAILED.
    pub error: Option<String>,
    /// Number of claims performed on this row.
    pub attempts: i32,
    /// Whether the last failure may be retried automatically.
    pub retryable: bool,
    pub claimed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Notification {
    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::from_str(&self.status)
    }

    pub fn kind(&self) -> Option<NotificationKind> {
        NotificationKind::from_str(&self.kind)
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.scheduled_at
    }

    pub fn can_be_sent(&self, now: NaiveDateTime) -> bool {
        self.status() == Some(NotificationStatus::Pending) && self.is_due(now)
    }
}

/// Data required to schedule a new notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub kind: NotificationKind,
    pub booking_id: i64,
    pub user_id: String,
    pub scheduled_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_notification(status: &str, scheduled_at: NaiveDateTime) -> Notification {
        let now = Utc::now().naive_utc();
        Notification {
            id: 1,
            kind: "booking_1h".to_string(),
            status: status.to_string(),
            booking_id: 1,
            user_id: "u1".to_string(),
            scheduled_at,
            processed_at: None,
            message: None,
            error: None,
            attempts: 0,
            retryable: false,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn kind_round_trips_through_storage_text() {
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::from_str("booking_2h"), None);
    }

    #[test]
    fn due_and_sendable() {
        let now = Utc::now().naive_utc();
        let due = make_notification("pending", now - Duration::minutes(5));
        assert!(due.is_due(now));
        assert!(due.can_be_sent(now));

        let boundary = make_notification("pending", now);
        assert!(boundary.is_due(now));

        let future = make_notification("pending", now + Duration::minutes(5));
        assert!(!future.is_due(now));
        assert!(!future.can_be_sent(now));

        let processing = make_notification("processing", now - Duration::minutes(5));
        assert!(processing.is_due(now));
        assert!(!processing.can_be_sent(now));
    }

    #[test]
    fn parses_stored_status() {
        assert_eq!(NotificationStatus::from_str("FAILED"), Some(NotificationStatus::Failed));
        assert_eq!(NotificationStatus::Sent.as_str(), "sent");
        assert!(NotificationStatus::from_str("bogus").is_none());
    }
}
