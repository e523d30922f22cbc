// src/services/subscriptions.rs
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, info};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::{BotError, Result};
use crate::models::{ChatId, Cycle, RecipientSubscription};
use crate::services::dates::{format_store_timestamp, parse_store_timestamp};

pub const COLLECTION: &str = "ssbbot_chat_settings";

/// Per-chat subscription records, keyed by chat id.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, chat_id: ChatId) -> Result<Option<RecipientSubscription>>;

    async fn insert(&self, subscription: &RecipientSubscription) -> Result<()>;

    async fn set_subscribed(&self, chat_id: ChatId, subscribed: bool) -> Result<()>;

    /// Advances the chat's marker to `cycle`; an older cycle is ignored.
    async fn mark_notified(&self, chat_id: ChatId, cycle: Cycle, at: NaiveDateTime) -> Result<()>;

    async fn delete(&self, chat_id: ChatId) -> Result<()>;

    /// Subscribed chats whose marker differs from `cycle`.
    async fn list_pending(&self, cycle: Cycle) -> Result<Vec<RecipientSubscription>>;

    /// Returns the record and whether it already existed.
    async fn create_if_absent(&self, chat_id: ChatId) -> Result<(RecipientSubscription, bool)> {
        if let Some(existing) = self.get(chat_id).await? {
            return Ok((existing, true));
        }
        let created = RecipientSubscription::new(chat_id);
        self.insert(&created).await?;
        Ok((created, false))
    }

    /// Moves a record to a new chat id, e.g. when a group becomes a supergroup.
    async fn migrate(&self, from: ChatId, to: ChatId) -> Result<()> {
        let Some(mut subscription) = self.get(from).await? else {
            return Ok(());
        };
        self.delete(from).await?;
        subscription.chat_id = to;
        self.insert(&subscription).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatSettingsRecord {
    chat_id: String,
    #[serde(default)]
    subscribed: bool,
    #[serde(default)]
    latest_ssb_cycle_notified: Option<String>,
    #[serde(default)]
    last_notification_time: Option<String>,
}

impl From<&RecipientSubscription> for ChatSettingsRecord {
    fn from(sub: &RecipientSubscription) -> Self {
        ChatSettingsRecord {
            chat_id: sub.chat_id.to_store_key(),
            subscribed: sub.subscribed,
            latest_ssb_cycle_notified: sub.last_notified_cycle.map(|c| c.to_string()),
            last_notification_time: sub.last_notification_time.map(format_store_timestamp),
        }
    }
}

impl TryFrom<ChatSettingsRecord> for RecipientSubscription {
    type Error = BotError;

    fn try_from(record: ChatSettingsRecord) -> Result<Self> {
        let last_notified_cycle = record
            .latest_ssb_cycle_notified
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Cycle>()
                    .map_err(|e| BotError::StoreFailure(e.to_string()))
            })
            .transpose()?;
        let last_notification_time = record
            .last_notification_time
            .as_deref()
            .map(parse_store_timestamp)
            .transpose()?;

        Ok(RecipientSubscription {
            chat_id: ChatId::from_store_key(&record.chat_id)?,
            subscribed: record.subscribed,
            last_notified_cycle,
            last_notification_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DirectusList {
    #[serde(default)]
    data: Vec<ChatSettingsRecord>,
}

fn decode_records(body: &str) -> Result<Vec<RecipientSubscription>> {
    let list: DirectusList = serde_json::from_str(body)
        .map_err(|e| BotError::StoreFailure(format!("unexpected Directus payload: {}", e)))?;
    list.data
        .into_iter()
        .map(RecipientSubscription::try_from)
        .collect()
}

fn pending_filter(cycle: Cycle) -> Value {
    json!({
        "query": {
            "filter": {
                "_and": [
                    { "subscribed": { "_eq": true } },
                    { "_or": [
                        { "latest_ssb_cycle_notified": { "_neq": cycle.to_string() } },
                        { "latest_ssb_cycle_notified": { "_null": true } }
                    ] }
                ]
            },
            "limit": -1
        }
    })
}

fn chat_filter(chat_id: ChatId) -> Value {
    json!({
        "query": {
            "filter": {
                "chat_id": { "_eq": chat_id.to_store_key() }
            }
        }
    })
}

/// Subscription records kept in a Directus collection.
pub struct DirectusStore {
    client: Client,
    host: String,
    token: String,
}

impl DirectusStore {
    pub fn new(config: &AppConfig) -> Self {
        DirectusStore {
            client: Client::new(),
            host: config.directus_host.clone(),
            token: config.directus_token.clone(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/items/{}", self.host, COLLECTION)
    }

    fn item_url(&self, chat_id: ChatId) -> String {
        format!("{}/{}", self.collection_url(), chat_id.to_store_key())
    }

    async fn execute(&self, request: RequestBuilder, action: &str) -> Result<String> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BotError::StoreFailure(format!("{}: {}", action, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::StoreFailure(format!("{}: {}", action, e)))?;
        if !status.is_success() {
            return Err(BotError::StoreFailure(format!(
                "error {} in directus ({}): {}",
                action, status, body
            )));
        }
        Ok(body)
    }

    async fn search(&self, query: &Value, action: &str) -> Result<Vec<RecipientSubscription>> {
        let method = Method::from_bytes(b"SEARCH")
            .map_err(|e| BotError::StoreFailure(e.to_string()))?;
        let request = self.client.request(method, self.collection_url()).json(query);
        let body = self.execute(request, action).await?;
        decode_records(&body)
    }

    async fn patch(&self, chat_id: ChatId, patch: &Value, action: &str) -> Result<()> {
        let request = self.client.patch(self.item_url(chat_id)).json(patch);
        self.execute(request, action).await.map(|_| ())
    }
}

#[async_trait]
impl SubscriptionStore for DirectusStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<RecipientSubscription>> {
        let records = self
            .search(&chat_filter(chat_id), "getting chat settings")
            .await?;
        Ok(records.into_iter().next())
    }

    async fn insert(&self, subscription: &RecipientSubscription) -> Result<()> {
        let record = ChatSettingsRecord::from(subscription);
        let request = self.client.post(self.collection_url()).json(&record);
        self.execute(request, "inserting chat settings").await?;
        info!("Created chat settings for {}", subscription.chat_id);
        Ok(())
    }

    async fn set_subscribed(&self, chat_id: ChatId, subscribed: bool) -> Result<()> {
        self.patch(
            chat_id,
            &json!({ "subscribed": subscribed }),
            "updating subscription",
        )
        .await
    }

    async fn mark_notified(&self, chat_id: ChatId, cycle: Cycle, at: NaiveDateTime) -> Result<()> {
        let mut subscription = self
            .get(chat_id)
            .await?
            .ok_or_else(|| BotError::StoreFailure(format!("chat {} not found", chat_id)))?;
        let before = subscription.last_notified_cycle;
        subscription.mark_notified(cycle, at);
        if subscription.last_notified_cycle == before {
            debug!("Chat {} already marked for {:?}, skipping update", chat_id, before);
            return Ok(());
        }

        let record = ChatSettingsRecord::from(&subscription);
        self.patch(
            chat_id,
            &json!({
                "latest_ssb_cycle_notified": record.latest_ssb_cycle_notified,
                "last_notification_time": record.last_notification_time,
            }),
            "updating chat settings",
        )
        .await
    }

    async fn delete(&self, chat_id: ChatId) -> Result<()> {
        let request = self.client.delete(self.item_url(chat_id));
        self.execute(request, "deleting chat settings").await?;
        info!("Deleted chat settings for {}", chat_id);
        Ok(())
    }

    async fn list_pending(&self, cycle: Cycle) -> Result<Vec<RecipientSubscription>> {
        self.search(&pending_filter(cycle), "searching chats to notify")
            .await
    }
}
