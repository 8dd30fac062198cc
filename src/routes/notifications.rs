use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Notification, NotificationFilter, NotificationRepository, NotificationStatus};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::routes::admin::AdminAuth;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/stats", get(get_notification_stats))
        .route("/:id", get(get_notification))
        .route("/:id/requeue", post(requeue_notification))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub booking_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub items: Vec<NotificationResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub booking_id: i64,
    pub user_id: String,
    pub scheduled_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub created_at: NaiveDateTime,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            kind: n.kind,
            status: n.status,
            booking_id: n.booking_id,
            user_id: n.user_id,
            scheduled_at: n.scheduled_at,
            processed_at: n.processed_at,
            message: n.message,
            error: n.error,
            attempts: n.attempts,
            created_at: n.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationStatsResponse {
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub failed: i64,
    pub total: i64,
}

impl From<HashMap<String, i64>> for NotificationStatsResponse {
    fn from(counts: HashMap<String, i64>) -> Self {
        let get = |status: NotificationStatus| counts.get(status.as_str()).copied().unwrap_or(0);
        Self {
            pending: get(NotificationStatus::Pending),
            processing: get(NotificationStatus::Processing),
            sent: get(NotificationStatus::Sent),
            failed: get(NotificationStatus::Failed),
            total: counts.values().sum(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
    pub message: String,
    pub notification: NotificationResponse,
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(i18n::t_with("not_found.notification", &[("id", &id.to_string())]))
}

// ============================================================================
// Handlers
// ============================================================================

/// List notifications, newest schedule first, with optional filters
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<NotificationsListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1).checked_mul(per_page).ok_or_else(|| {
        AppError::BadRequest(i18n::t_with(
            "bad_request.invalid_page",
            &[("page", &page.to_string())],
        ))
    })?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(
            NotificationStatus::from_str(raw)
                .ok_or_else(|| {
                    AppError::BadRequest(i18n::t_with(
                        "bad_request.invalid_status",
                        &[("status", raw)],
                    ))
                })?
                .as_str()
                .to_string(),
        ),
        None => None,
    };

    let filter = NotificationFilter {
        status,
        booking_id: query.booking_id,
    };

    let (notifications, total) = tokio::try_join!(
        NotificationRepository::list(&state.db, &filter, per_page, offset),
        NotificationRepository::count(&state.db, &filter)
    )?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(Json(NotificationsListResponse {
        items: notifications.into_iter().map(NotificationResponse::from).collect(),
        total,
        page,
        per_page,
        total_pages,
    }))
}

/// Row counts per status
async fn get_notification_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> AppResult<Json<NotificationStatsResponse>> {
    let counts = NotificationRepository::counts_by_status(&state.db).await?;
    Ok(Json(counts.into()))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(id): Path<i64>,
) -> AppResult<Json<NotificationResponse>> {
    let notification = NotificationRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(notification.into()))
}

/// Put a FAILED notification back to PENDING
async fn requeue_notification(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(id): Path<i64>,
) -> AppResult<Json<RequeueResponse>> {
    let now = Utc::now().naive_utc();

    if !NotificationRepository::requeue(&state.db, id, now).await? {
        return match NotificationRepository::find_by_id(&state.db, id).await? {
            Some(_) => Err(AppError::Conflict(i18n::t("conflict.notification_not_failed"))),
            None => Err(not_found(id)),
        };
    }

    let notification = NotificationRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!("Notification {} re-queued by operator", id);

    Ok(Json(RequeueResponse {
        message: i18n::t("notification.requeued"),
        notification: notification.into(),
    }))
}
