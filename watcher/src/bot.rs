//! Telegram command front-end.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use crate::errors::Result;
use crate::manager::SubscriptionManager;
use crate::metrics::COMMANDS_TOTAL;
use crate::model::{SubscribeOutcome, UnsubscribeOutcome, UserId};
use crate::validate::validate_device;

const FAILURE_REPLY: &str = "Something went wrong, please try again later.";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Show usage")]
    Start,

    #[command(description = "Show this help")]
    Help,

    #[command(description = "List available devices")]
    Devices,

    #[command(description = "List your subscriptions")]
    Subscriptions,

    #[command(description = "Get moisture updates for a device: /subscribe <device>")]
    Subscribe(String),

    #[command(description = "Stop updates for a device: /unsubscribe <device>")]
    Unsubscribe(String),
}

/// Dispatches incoming commands until the process exits.
pub async fn run_bot(bot: Bot, manager: Arc<SubscriptionManager>) {
    info!("Starting Telegram command dispatcher");

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
            let manager = Arc::clone(&manager);
            async move { handle_command(bot, msg, cmd, manager).await }
        });

    Dispatcher::builder(bot, handler)
        .default_handler(|_upd| async {})
        .build()
        .dispatch()
        .await;

    warn!("Telegram dispatcher exited");
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    manager: Arc<SubscriptionManager>,
) -> ResponseResult<()> {
    COMMANDS_TOTAL.inc();
    let user_id = msg.chat.id.0;
    info!(user_id, "Command received: {:?}", cmd);

    let reply = respond(&manager, user_id, cmd).await;
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Produces the reply text for a command issued by `user_id`.
pub async fn respond(manager: &SubscriptionManager, user_id: UserId, cmd: Command) -> String {
    match execute(manager, user_id, cmd).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(user_id, "Command failed: {}", e);
            FAILURE_REPLY.to_string()
        }
    }
}

async fn execute(manager: &SubscriptionManager, user_id: UserId, cmd: Command) -> Result<String> {
    let reply = match cmd {
        Command::Start | Command::Help => Command::descriptions().to_string(),
        Command::Devices => {
            let devices = manager.list_devices().await?;
            if devices.is_empty() {
                "No devices found.".to_string()
            } else {
                devices.join(", ")
            }
        }
        Command::Subscriptions => {
            let devices = manager.list_subscriptions(user_id).await?;
            if devices.is_empty() {
                "You have no subscriptions.".to_string()
            } else {
                devices.join(", ")
            }
        }
        Command::Subscribe(arg) => {
            let device = arg.trim();
            if device.is_empty() {
                return Ok("Select a device to subscribe.".to_string());
            }
            if validate_device(device).is_err() {
                return Ok("Invalid device name.".to_string());
            }
            match manager.subscribe(user_id, device).await? {
                SubscribeOutcome::DeviceNotFound => "This device does not exist.".to_string(),
                SubscribeOutcome::AlreadySubscribed => {
                    format!("You are already subscribed to the {} device.", device)
                }
                SubscribeOutcome::Subscribed => {
                    format!("You are now subscribed to the {} device.", device)
                }
            }
        }
        Command::Unsubscribe(arg) => {
            let device = arg.trim();
            if device.is_empty() {
                return Ok("Select a device to unsubscribe.".to_string());
            }
            if validate_device(device).is_err() {
                return Ok("Invalid device name.".to_string());
            }
            match manager.unsubscribe(user_id, device).await? {
                UnsubscribeOutcome::NotSubscribed => {
                    format!("You are not subscribed to the {} device.", device)
                }
                UnsubscribeOutcome::Unsubscribed => {
                    format!("You are now unsubscribed from the {} device.", device)
                }
            }
        }
    };

    Ok(reply)
}
