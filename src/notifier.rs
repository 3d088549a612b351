use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, warn};

use crate::config::TelegramConfig;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends tagged alerts to a Telegram chat. Without credentials every
/// send degrades to a local log line and reports failure.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    telegram: Option<TelegramConfig>,
}

impl Notifier {
    pub fn new(telegram: Option<TelegramConfig>) -> Self {
        if telegram.is_none() {
            warn!("Telegram notifications are disabled. Set TELEGRAM_API_KEY and TELEGRAM_CHAT_ID in .env");
        }
        Self {
            client: reqwest::Client::new(),
            telegram,
        }
    }

    pub async fn send_info(&self, text: &str) -> bool {
        self.send(&format!("ℹ️ <b>Info</b>\n\n{text}")).await
    }

    pub async fn send_error(&self, text: &str) -> bool {
        self.send(&format!("🚨 <b>Error Alert</b>\n\n{text}")).await
    }

    async fn send(&self, text: &str) -> bool {
        let Some(telegram) = &self.telegram else {
            debug!("Telegram disabled. Would have sent: {text}");
            return false;
        };

        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            telegram.api_key
        );
        let result = self
            .client
            .post(&url)
            .timeout(DELIVERY_TIMEOUT)
            .json(&json!({
                "chat_id": telegram.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                debug!("Telegram notification sent successfully");
                true
            }
            Err(e) => {
                // delivery failures never escalate past the notifier
                error!("Failed to send Telegram notification - {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_is_a_no_op() {
        let notifier = Notifier::new(None);
        assert!(!notifier.send_info("new listing").await);
        assert!(!notifier.send_error("boom").await);
    }
}
