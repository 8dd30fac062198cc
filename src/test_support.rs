//! Fixtures shared by the unit tests: an in-memory database with the real
//! migrations applied and a recording `Notifier`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDateTime, Utc};
use http_body_util::BodyExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::Config;
use crate::error::NotificationError;
use crate::services::delivery::Notifier;
use crate::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// A single connection keeps every query on the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("in-memory sqlite url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");
    migrate(&pool).await;
    pool
}

async fn migrate(pool: &SqlitePool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("migrations");
}

/// File-backed database served by several connections, for tests that need
/// statements to really race. The file is removed on drop.
pub struct SharedTestDb {
    pub pool: SqlitePool,
    path: PathBuf,
}

impl SharedTestDb {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("booking-notifications-{}.db", Uuid::new_v4()));
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(StdDuration::from_secs(10))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(4)
            .max_connections(4)
            .connect_with(options)
            .await
            .expect("file sqlite");
        migrate(&pool).await;
        Self { pool, path }
    }
}

impl Drop for SharedTestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

pub async fn insert_user(pool: &SqlitePool, name: &str, telegram_chat_id: Option<&str>) -> String {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();
    sqlx::query(
        "INSERT INTO users (id, name, telegram_chat_id, lang, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(telegram_chat_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("insert user");
    id
}

pub async fn set_user_lang(pool: &SqlitePool, user_id: &str, lang: &str) {
    sqlx::query("UPDATE users SET lang = ? WHERE id = ?")
        .bind(lang)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("update user lang");
}

pub async fn insert_room(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO rooms (name, address) VALUES (?, 'Main street 1') RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("insert room")
}

pub async fn insert_booking(
    pool: &SqlitePool,
    room_id: i64,
    user_id: &str,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
) -> i64 {
    let now = Utc::now().naive_utc();
    sqlx::query_scalar(
        r#"
        INSERT INTO bookings (room_id, user_id, start_time, end_time, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(room_id)
    .bind(user_id)
    .bind(start_time)
    .bind(end_time)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .expect("insert booking")
}

/// Insert a notification row directly, bypassing kind validation.
pub async fn insert_raw_notification(
    pool: &SqlitePool,
    kind: &str,
    booking_id: i64,
    user_id: &str,
    scheduled_at: NaiveDateTime,
) -> i64 {
    let now = Utc::now().naive_utc();
    sqlx::query_scalar(
        r#"
        INSERT INTO notifications (kind, status, booking_id, user_id, scheduled_at, created_at, updated_at)
        VALUES (?, 'pending', ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(kind)
    .bind(booking_id)
    .bind(user_id)
    .bind(scheduled_at)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .expect("insert notification")
}

/// Records every message and fails for the configured recipients.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    reason: Mutex<String>,
    delay: Mutex<Option<StdDuration>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(self, user_id: &str, reason: &str) -> Self {
        self.failing.lock().unwrap().insert(user_id.to_string());
        *self.reason.lock().unwrap() = reason.to_string();
        self
    }

    pub fn with_delay(self, delay: StdDuration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: &str, message: &str) -> Result<(), NotificationError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(user_id) {
            return Err(NotificationError::Delivery(self.reason.lock().unwrap().clone()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), message.to_string()));
        Ok(())
    }
}

/// Application state over `pool` with the operator token set and no Telegram bot.
pub fn test_state(pool: SqlitePool, notifier: Arc<RecordingNotifier>) -> Arc<AppState> {
    let mut config = Config::default();
    config.admin.api_token = Some(TEST_ADMIN_TOKEN.to_string());
    Arc::new(AppState::new(
        pool,
        config,
        Arc::new(RwLock::new(None)),
        notifier,
    ))
}

pub fn admin_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", TEST_ADMIN_TOKEN))
        .body(Body::empty())
        .unwrap()
}

/// Send a request through the router and decode the JSON body (`Null` when empty).
pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
