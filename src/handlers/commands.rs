// src/handlers/commands.rs
use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::models::{ChatId, ReportWindow};
use crate::services::report::ReportGenerator;
use crate::services::subscriptions::SubscriptionStore;
use crate::services::telegram::{Dispatcher, Message};

pub const HELP_MESSAGE: &str = "This bot updates you on the Singapore Savings Bonds interest rates! The following commands are available:
/subscribe adds you into the monthly SSB interest rate updates
/unsubscribe removes you from the monthly SSB interest rate updates
/rates sends the latest SSB interest rates right now
/help shows this message";

pub const SUBSCRIBED_MESSAGE: &str =
    "Subscribed! You will get the interest rates of every new savings bond as soon as it is published.";
pub const UNSUBSCRIBED_MESSAGE: &str = "Unsubscribed. You will no longer receive monthly updates.";
pub const RATES_FAILED_MESSAGE: &str =
    "Sorry, the latest rates could not be fetched right now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Subscribe,
    Unsubscribe,
    Rates,
}

impl Command {
    /// Parses "/name" or "/name@botname" at the start of a message.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "help" | "start" => Some(Command::Help),
            "subscribe" => Some(Command::Subscribe),
            "unsubscribe" => Some(Command::Unsubscribe),
            "rates" => Some(Command::Rates),
            _ => None,
        }
    }
}

/// Everything a command needs, shared by the update loop.
pub struct BotContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SubscriptionStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub reports: Arc<ReportGenerator>,
}

pub async fn handle_message(ctx: &BotContext, message: &Message) -> Result<()> {
    let chat_id = ChatId(message.chat.id);

    if let Some(to) = message.migrate_to_chat_id {
        info!("Chat {} migrated to {}", chat_id, to);
        return ctx.store.migrate(chat_id, ChatId(to)).await;
    }

    ctx.store.create_if_absent(chat_id).await?;

    let Some(command) = message.text.as_deref().and_then(Command::parse) else {
        return Ok(());
    };

    let username = message.from.as_ref().and_then(|u| u.username.as_deref());
    if !ctx.config.is_username_allowed(username) {
        warn!(
            "Ignoring {:?} from {:?} in chat {}: not whitelisted",
            command, username, chat_id
        );
        return Ok(());
    }

    info!("Handling {:?} for chat {}", command, chat_id);
    match command {
        Command::Help => ctx.dispatcher.send_text(chat_id, HELP_MESSAGE).await,
        Command::Subscribe => {
            ctx.store.set_subscribed(chat_id, true).await?;
            ctx.dispatcher.send_text(chat_id, SUBSCRIBED_MESSAGE).await
        }
        Command::Unsubscribe => {
            ctx.store.delete(chat_id).await?;
            ctx.dispatcher.send_text(chat_id, UNSUBSCRIBED_MESSAGE).await
        }
        Command::Rates => send_rates(ctx, chat_id).await,
    }
}

async fn send_rates(ctx: &BotContext, chat_id: ChatId) -> Result<()> {
    let today = Utc::now().with_timezone(&ctx.config.timezone).date_naive();
    let window = ReportWindow::ending_after(today);

    let delivered = match ctx.reports.build_report(chat_id, window).await {
        Ok(report) => ctx.dispatcher.send_report(&report).await,
        Err(e) => Err(e),
    };
    if let Err(e) = delivered {
        error!("On-demand report for chat {} failed: {}", chat_id, e);
        ctx.dispatcher.send_text(chat_id, RATES_FAILED_MESSAGE).await?;
    }
    Ok(())
}
