use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};

use crate::error::AppResult;
use crate::routes::admin::AdminAuth;
use crate::services::reviews::ReviewSweepReport;
use crate::services::scheduler::SweepReport;
use crate::AppState;

/// On-demand triggers for the same sweeps the background workers run.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", post(run_notification_sweep))
        .route("/review-reminders", post(run_review_reminder_sweep))
}

async fn run_notification_sweep(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> AppResult<Json<SweepReport>> {
    tracing::info!("Notification sweep triggered by operator");
    Ok(Json(state.scheduler.run_sweep().await?))
}

async fn run_review_reminder_sweep(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> AppResult<Json<ReviewSweepReport>> {
    tracing::info!("Review reminder sweep triggered by operator");
    Ok(Json(state.reviews.run_review_reminder_sweep().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        admin_request, call, insert_booking, insert_raw_notification, insert_room, insert_user,
        test_pool, test_state, RecordingNotifier,
    };
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn manual_sweeps_report_counters() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();
        let user = insert_user(&pool, "Boris", Some("6")).await;
        let room = insert_room(&pool, "Hall").await;
        let ended = insert_booking(
            &pool,
            room,
            &user,
            now - Duration::hours(2),
            now - Duration::hours(1),
        )
        .await;
        insert_raw_notification(&pool, "booking_end", ended, &user, now - Duration::hours(1)).await;

        let notifier = Arc::new(RecordingNotifier::new());
        let app = crate::routes::router().with_state(test_state(pool, notifier.clone()));

        let (status, body) = call(&app, admin_request("POST", "/api/sweeps/notifications")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fetched"], 1);
        assert_eq!(body["sent"], 1);

        let (status, body) = call(&app, admin_request("POST", "/api/sweeps/review-reminders")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dispatched"], 1);

        assert_eq!(notifier.sent().len(), 2);
    }
}
