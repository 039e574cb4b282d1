use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::debug;

use crate::errors::Result;
use crate::model::UserId;

/// Delivers text to a user. An `Err` means the message may not have arrived.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// Sends notifications as Telegram messages to the subscriber's chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, user_id: UserId, text: &str) -> Result<()> {
        self.bot.send_message(ChatId(user_id), text).await?;
        debug!(user_id, "Telegram message delivered");
        Ok(())
    }
}
