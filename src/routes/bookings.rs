use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::error::AppResult;
use crate::routes::admin::AdminAuth;
use crate::routes::notifications::NotificationResponse;
use crate::services::planner;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id/notifications", post(schedule_notifications))
        .route("/:id/cancellation", post(cancel_booking))
}

#[derive(Debug, Serialize)]
pub struct ScheduledResponse {
    pub booking_id: i64,
    pub created: Vec<NotificationResponse>,
}

#[derive(Debug, Serialize)]
pub struct CancellationResponse {
    pub booking_id: i64,
    pub notification: Option<NotificationResponse>,
}

/// Plan the lifecycle notifications of a booking (idempotent)
async fn schedule_notifications(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(booking_id): Path<i64>,
) -> AppResult<(StatusCode, Json<ScheduledResponse>)> {
    let created =
        planner::schedule_for_booking(&state.db, booking_id, Utc::now().naive_utc()).await?;

    let status = if created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(ScheduledResponse {
            booking_id,
            created: created.into_iter().map(NotificationResponse::from).collect(),
        }),
    ))
}

/// Cancel a booking and queue the cancellation notice
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(booking_id): Path<i64>,
) -> AppResult<Json<CancellationResponse>> {
    let notification =
        planner::schedule_cancellation(&state.db, booking_id, Utc::now().naive_utc()).await?;

    Ok(Json(CancellationResponse {
        booking_id,
        notification: notification.map(NotificationResponse::from),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        admin_request, call, insert_booking, insert_room, insert_user, test_pool, test_state,
        RecordingNotifier,
    };
    use chrono::Duration;

    #[tokio::test]
    async fn schedules_then_cancels() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();
        let user = insert_user(&pool, "Arina", Some("5")).await;
        let room = insert_room(&pool, "Blue room").await;
        let start = now + Duration::days(3);
        let booking = insert_booking(&pool, room, &user, start, start + Duration::hours(1)).await;
        let app = crate::routes::router()
            .with_state(test_state(pool, Arc::new(RecordingNotifier::new())));

        let uri = format!("/api/bookings/{}/notifications", booking);
        let (status, body) = call(&app, admin_request("POST", &uri)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created"].as_array().map(|a| a.len()), Some(4));

        let (status, body) = call(&app, admin_request("POST", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"].as_array().map(|a| a.len()), Some(0));

        let uri = format!("/api/bookings/{}/cancellation", booking);
        let (status, body) = call(&app, admin_request("POST", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notification"]["kind"], "booking_cancel");

        let (status, _) = call(&app, admin_request("POST", "/api/bookings/9999/cancellation")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
