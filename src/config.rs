use std::env;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub admin: AdminConfig,
    pub scheduler: SchedulerConfig,
    pub review_reminder: ReviewReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for the operator API. When unset every `/api` route answers 403.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the background notification worker runs at all.
    pub enabled: bool,
    /// Maximum rows claimed per sweep.
    pub batch_size: i64,
    /// Seconds between two sweeps.
    pub check_interval_seconds: u64,
    /// Due rows older than this are no longer attempted.
    pub lookback_hours: i64,
    /// Upper bound for a single delivery call.
    pub delivery_timeout_seconds: u64,
    /// PROCESSING rows claimed longer ago than this are considered orphaned.
    pub stuck_timeout_seconds: i64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Off by default: FAILED is terminal unless an operator re-queues the row.
    pub enabled: bool,
    /// Total claims allowed per row, the first delivery included.
    pub max_attempts: i32,
    pub initial_backoff_seconds: u64,
    pub max_backoff_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewReminderConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// How long after `end_time` a booking becomes eligible for a feedback request.
    pub grace_minutes: i64,
    pub batch_size: i64,
    /// Failed dispatches after which a booking is no longer asked.
    pub max_attempts: i32,
    /// Wait after a failed dispatch before the booking is selected again.
    pub retry_after_minutes: i64,
}

/// Longest window accepted for any duration setting.
const MAX_WINDOW_HOURS: i64 = 24 * 366;
const MAX_WINDOW_MINUTES: i64 = MAX_WINDOW_HOURS * 60;
const MAX_WINDOW_SECONDS: i64 = MAX_WINDOW_MINUTES * 60;

impl SchedulerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }

    pub fn stuck_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_timeout_seconds)
    }
}

impl ReviewReminderConfig {
    pub fn grace(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.grace_minutes)
    }

    pub fn retry_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.retry_after_minutes)
    }
}

impl RetryConfig {
    /// Delay before a row that failed `attempts` times becomes eligible again:
    /// `min(max_backoff, initial_backoff * 2^(attempts - 1))`.
    pub fn backoff_for(&self, attempts: i32) -> chrono::Duration {
        let mut delay: u128 = self.initial_backoff_seconds as u128;
        for _ in 1..attempts.max(1) {
            delay = delay.saturating_mul(2);
            if delay >= self.max_backoff_seconds as u128 {
                break;
            }
        }
        let capped = delay.min(self.max_backoff_seconds as u128) as i64;
        chrono::Duration::seconds(capped)
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env_parse("PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            telegram: TelegramConfig {
                bot_token: env::var("TELEGRAM_BOT_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty()),
            },
            admin: AdminConfig {
                api_token: env::var("ADMIN_API_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty()),
            },
            scheduler: SchedulerConfig {
                enabled: env_bool("NOTIFICATION_SCHEDULER_ENABLED", true),
                batch_size: env_parse("NOTIFICATION_BATCH_SIZE", defaults.scheduler.batch_size)?,
                check_interval_seconds: env_parse(
                    "NOTIFICATION_CHECK_INTERVAL_SECONDS",
                    defaults.scheduler.check_interval_seconds,
                )?,
                lookback_hours: env_parse(
                    "NOTIFICATION_LOOKBACK_HOURS",
                    defaults.scheduler.lookback_hours,
                )?,
                delivery_timeout_seconds: env_parse(
                    "NOTIFICATION_DELIVERY_TIMEOUT_SECONDS",
                    defaults.scheduler.delivery_timeout_seconds,
                )?,
                stuck_timeout_seconds: env_parse(
                    "NOTIFICATION_STUCK_TIMEOUT_SECONDS",
                    defaults.scheduler.stuck_timeout_seconds,
                )?,
                retry: RetryConfig {
                    enabled: env_bool("NOTIFICATION_RETRY_ENABLED", false),
                    max_attempts: env_parse(
                        "NOTIFICATION_RETRY_MAX_ATTEMPTS",
                        defaults.scheduler.retry.max_attempts,
                    )?,
                    initial_backoff_seconds: env_parse(
                        "NOTIFICATION_RETRY_INITIAL_BACKOFF_SECONDS",
                        defaults.scheduler.retry.initial_backoff_seconds,
                    )?,
                    max_backoff_seconds: env_parse(
                        "NOTIFICATION_RETRY_MAX_BACKOFF_SECONDS",
                        defaults.scheduler.retry.max_backoff_seconds,
                    )?,
                },
            },
            review_reminder: ReviewReminderConfig {
                enabled: env_bool("REVIEW_REMINDER_ENABLED", true),
                interval_seconds: env_parse(
                    "REVIEW_REMINDER_INTERVAL_SECONDS",
                    defaults.review_reminder.interval_seconds,
                )?,
                grace_minutes: env_parse(
                    "REVIEW_REMINDER_GRACE_MINUTES",
                    defaults.review_reminder.grace_minutes,
                )?,
                batch_size: env_parse(
                    "REVIEW_REMINDER_BATCH_SIZE",
                    defaults.review_reminder.batch_size,
                )?,
                max_attempts: env_parse(
                    "REVIEW_REMINDER_MAX_ATTEMPTS",
                    defaults.review_reminder.max_attempts,
                )?,
                retry_after_minutes: env_parse(
                    "REVIEW_REMINDER_RETRY_AFTER_MINUTES",
                    defaults.review_reminder.retry_after_minutes,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        let retry = &scheduler.retry;
        let review = &self.review_reminder;

        check(scheduler.batch_size > 0, "NOTIFICATION_BATCH_SIZE")?;
        check(
            in_window(scheduler.check_interval_seconds),
            "NOTIFICATION_CHECK_INTERVAL_SECONDS",
        )?;
        check(
            (1..=MAX_WINDOW_HOURS).contains(&scheduler.lookback_hours),
            "NOTIFICATION_LOOKBACK_HOURS",
        )?;
        check(
            in_window(scheduler.delivery_timeout_seconds),
            "NOTIFICATION_DELIVERY_TIMEOUT_SECONDS",
        )?;
        // A stuck row must have outlived any in-flight delivery.
        check(
            scheduler.stuck_timeout_seconds > scheduler.delivery_timeout_seconds as i64
                && scheduler.stuck_timeout_seconds <= MAX_WINDOW_SECONDS,
            "NOTIFICATION_STUCK_TIMEOUT_SECONDS",
        )?;
        check(retry.max_attempts >= 1, "NOTIFICATION_RETRY_MAX_ATTEMPTS")?;
        check(
            in_window(retry.max_backoff_seconds),
            "NOTIFICATION_RETRY_MAX_BACKOFF_SECONDS",
        )?;
        check(
            retry.initial_backoff_seconds >= 1
                && retry.initial_backoff_seconds <= retry.max_backoff_seconds,
            "NOTIFICATION_RETRY_INITIAL_BACKOFF_SECONDS",
        )?;
        check(
            in_window(review.interval_seconds),
            "REVIEW_REMINDER_INTERVAL_SECONDS",
        )?;
        check(
            (0..=MAX_WINDOW_MINUTES).contains(&review.grace_minutes),
            "REVIEW_REMINDER_GRACE_MINUTES",
        )?;
        check(review.batch_size > 0, "REVIEW_REMINDER_BATCH_SIZE")?;
        check(review.max_attempts >= 1, "REVIEW_REMINDER_MAX_ATTEMPTS")?;
        check(
            (1..=MAX_WINDOW_MINUTES).contains(&review.retry_after_minutes),
            "REVIEW_REMINDER_RETRY_AFTER_MINUTES",
        )?;
        Ok(())
    }
}

fn in_window(seconds: u64) -> bool {
    seconds >= 1 && seconds <= MAX_WINDOW_SECONDS as u64
}

fn check(ok: bool, name: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(name.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            telegram: TelegramConfig { bot_token: None },
            admin: AdminConfig { api_token: None },
            scheduler: SchedulerConfig {
                enabled: true,
                batch_size: 50,
                check_interval_seconds: 60,
                lookback_hours: 24,
                delivery_timeout_seconds: 30,
                stuck_timeout_seconds: 600,
                retry: RetryConfig {
                    enabled: false,
                    max_attempts: 3,
                    initial_backoff_seconds: 60,
                    max_backoff_seconds: 3600,
                },
            },
            review_reminder: ReviewReminderConfig {
                enabled: true,
                interval_seconds: 300,
                grace_minutes: 15,
                batch_size: 50,
                max_attempts: 5,
                retry_after_minutes: 60,
            },
        }
    }
}
