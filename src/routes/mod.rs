use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub mod admin;
pub mod bookings;
pub mod health;
pub mod notifications;
pub mod sweeps;

/// All HTTP routes, without middleware layers.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Operator API
        .nest("/api/notifications", notifications::router())
        .nest("/api/bookings", bookings::router())
        .nest("/api/sweeps", sweeps::router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::{call, test_pool, test_state, RecordingNotifier, TEST_ADMIN_TOKEN};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let state = test_state(test_pool().await, Arc::new(RecordingNotifier::new()));
        let app = router().with_state(state);

        let (status, body) = call(&app, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["telegram"], false);
    }

    #[tokio::test]
    async fn operator_api_requires_the_admin_token() {
        let state = test_state(test_pool().await, Arc::new(RecordingNotifier::new()));
        let app = router().with_state(state);

        let (status, body) = call(&app, get("/api/notifications", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = call(&app, get("/api/notifications", Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, get("/api/notifications", Some(TEST_ADMIN_TOKEN))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn operator_api_is_closed_without_configured_token() {
        let pool = test_pool().await;
        let mut config = Config::default();
        config.admin.api_token = None;
        let state = Arc::new(crate::AppState::new(
            pool,
            config,
            Arc::new(tokio::sync::RwLock::new(None)),
            Arc::new(RecordingNotifier::new()),
        ));
        let app = router().with_state(state);

        let (status, body) = call(&app, get("/api/notifications/stats", Some("anything"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }
}
