// src/handlers/updates.rs
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::commands::{handle_message, BotContext};
use crate::services::telegram::TelegramClient;

const LONG_POLL_SECS: u64 = 60;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Pulls inbound updates forever and hands each message to the command handler.
pub async fn run_update_loop(ctx: Arc<BotContext>, telegram: Arc<TelegramClient>) {
    info!("Listening for Telegram updates");
    let mut offset: Option<i64> = None;

    loop {
        let updates = match telegram.get_updates(offset, LONG_POLL_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Failed to fetch updates: {}", e);
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            if let Some(message) = update.message {
                if let Err(e) = handle_message(&ctx, &message).await {
                    error!("Failed to handle message in chat {}: {}", message.chat.id, e);
                }
            }
        }
    }
}
