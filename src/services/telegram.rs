use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::RwLock;

use crate::db::UserRepository;
use crate::error::{AppError, AppResult, NotificationError};
use crate::services::delivery::Notifier;

#[derive(Clone)]
pub struct TelegramService {
    bot: Bot,
}

#[derive(Debug, Clone)]
pub struct TelegramMessage {
    pub chat_id: String,
    pub text: String,
    pub disable_web_page_preview: bool,
    pub disable_notification: bool,
}

impl Default for TelegramMessage {
    fn default() -> Self {
        Self {
            chat_id: String::new(),
            text: String::new(),
            disable_web_page_preview: true,
            disable_notification: false,
        }
    }
}

impl TelegramService {
    pub async fn new(token: String) -> AppResult<Self> {
        let bot = Bot::new(token);

        // Verify the bot token by getting bot info
        match bot.get_me().await {
            Ok(me) => {
                tracing::info!("Telegram bot initialized: @{}", me.username());
                Ok(Self { bot })
            }
            Err(e) => {
                tracing::error!("Failed to initialize Telegram bot: {}", e);
                Err(AppError::Telegram(format!(
                    "Failed to initialize bot: {}",
                    e
                )))
            }
        }
    }

    pub async fn send_message(&self, message: TelegramMessage) -> AppResult<i32> {
        let chat_id: i64 = message
            .chat_id
            .parse()
            .map_err(|_| AppError::Telegram("Invalid chat_id".to_string()))?;

        let request = self
            .bot
            .send_message(ChatId(chat_id), &message.text)
            .disable_web_page_preview(message.disable_web_page_preview)
            .disable_notification(message.disable_notification);

        match request.await {
            Ok(sent_message) => {
                tracing::debug!(
                    "Telegram message sent to {}: message_id={}",
                    message.chat_id,
                    sent_message.id
                );
                Ok(sent_message.id.0)
            }
            Err(e) => {
                tracing::error!("Failed to send Telegram message: {}", e);
                Err(AppError::Telegram(format!("Failed to send message: {}", e)))
            }
        }
    }
}

/// Delivers notifications to the recipient's linked Telegram chat.
///
/// The bot is optional: when it was not configured or failed to start, every
/// send is a delivery failure and the row ends FAILED with that reason.
pub struct TelegramNotifier {
    pool: SqlitePool,
    telegram: Arc<RwLock<Option<TelegramService>>>,
}

impl TelegramNotifier {
    pub fn new(pool: SqlitePool, telegram: Arc<RwLock<Option<TelegramService>>>) -> Self {
        Self { pool, telegram }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, user_id: &str, message: &str) -> Result<(), NotificationError> {
        let user = UserRepository::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| NotificationError::Delivery("recipient not found".to_string()))?;

        let chat_id = user.telegram_chat_id.ok_or_else(|| {
            NotificationError::Delivery("recipient has no linked Telegram chat".to_string())
        })?;

        // Clone the Option<TelegramService> out of the RwLock guard so we can own it
        let telegram = self
            .telegram
            .read()
            .await
            .clone()
            .ok_or_else(|| {
                NotificationError::Delivery("Telegram service not initialized".to_string())
            })?;

        telegram
            .send_message(TelegramMessage {
                chat_id,
                text: message.to_string(),
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(NotificationError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, test_pool};

    #[tokio::test]
    async fn missing_chat_is_a_delivery_failure() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "Lena", None).await;
        let notifier = TelegramNotifier::new(pool.clone(), Arc::new(RwLock::new(None)));

        match notifier.send(&user, "hi").await {
            Err(NotificationError::Delivery(reason)) => {
                assert_eq!(reason, "recipient has no linked Telegram chat")
            }
            other => panic!("expected Delivery, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn uninitialized_bot_is_a_delivery_failure() {
        let pool = test_pool().await;
        let user = insert_user(&pool, "Mark", Some("12345")).await;
        let notifier = TelegramNotifier::new(pool.clone(), Arc::new(RwLock::new(None)));

        match notifier.send(&user, "hi").await {
            Err(NotificationError::Delivery(reason)) => {
                assert_eq!(reason, "Telegram service not initialized")
            }
            other => panic!("expected Delivery, got: {:?}", other),
        }

        match notifier.send("no-such-user", "hi").await {
            Err(NotificationError::Delivery(reason)) => assert_eq!(reason, "recipient not found"),
            other => panic!("expected Delivery, got: {:?}", other),
        }
    }
}
