use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotificationError;

/// "Send a message to a user". Transports (Telegram, e-mail, push) are interchangeable.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, user_id: &str, message: &str) -> Result<(), NotificationError>;
}

/// Run a delivery with an upper bound; a timeout counts as a delivery failure.
pub async fn send_with_timeout(
    notifier: &dyn Notifier,
    user_id: &str,
    message: &str,
    timeout: Duration,
) -> Result<(), NotificationError> {
    match tokio::time::timeout(timeout, notifier.send(user_id, message)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::Delivery(format!(
            "delivery timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingNotifier;

    #[tokio::test]
    async fn passes_through_success() {
        let notifier = RecordingNotifier::new();
        let res = send_with_timeout(&notifier, "u1", "hello", Duration::from_secs(1)).await;
        tokio_test::assert_ok!(res);
        assert_eq!(notifier.sent(), vec![("u1".to_string(), "hello".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_delivery_times_out() {
        let notifier = RecordingNotifier::new().with_delay(Duration::from_secs(120));
        let res = send_with_timeout(&notifier, "u1", "hello", Duration::from_secs(30)).await;
        match tokio_test::assert_err!(res) {
            NotificationError::Delivery(reason) => {
                assert_eq!(reason, "delivery timed out after 30s")
            }
            other => panic!("expected Delivery, got: {:?}", other),
        }
        assert!(notifier.sent().is_empty());
    }
}
