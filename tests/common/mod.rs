//! In-memory stand-ins for the bond API, subscription store, Telegram and the chart renderer.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Months, NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ssb_notifier::config::AppConfig;
use ssb_notifier::error::{BotError, Result};
use ssb_notifier::models::{
    BondInterestProfile, ChatId, Cycle, RecipientSubscription, Report, SavingsBond,
};
use ssb_notifier::services::bonds::{BondSource, SortOrder};
use ssb_notifier::services::chart::{ChartData, ChartRenderer};
use ssb_notifier::services::report::ReportGenerator;
use ssb_notifier::services::scheduler::Scheduler;
use ssb_notifier::services::subscriptions::SubscriptionStore;
use ssb_notifier::services::telegram::Dispatcher;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn bond(code: &str, issue_date: NaiveDate) -> SavingsBond {
    SavingsBond {
        issue_code: code.to_string(),
        isin_code: None,
        auction_tenor: Some(10),
        issue_size: 800.0,
        amount_applied: None,
        issue_date,
        maturity_date: issue_date.checked_add_months(Months::new(120)).unwrap(),
        last_day_to_apply: issue_date,
        first_interest_date: issue_date,
        payment_month: "Mar,Sep".to_string(),
    }
}

pub fn profile(code: &str, ten_year: f64) -> BondInterestProfile {
    let mut returns = [2.8; 10];
    returns[9] = ten_year;
    BondInterestProfile {
        issue_code: code.to_string(),
        coupons: [2.8; 10],
        returns,
    }
}

/// Serves bonds in the order they were added, like an API ignoring the sort parameter.
#[derive(Default)]
pub struct FakeBonds {
    bonds: Mutex<Vec<SavingsBond>>,
    profiles: Mutex<HashMap<String, BondInterestProfile>>,
    pub fail_listing: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl FakeBonds {
    pub fn add(&self, code: &str, issue_date: NaiveDate, ten_year: f64) {
        self.bonds.lock().unwrap().push(bond(code, issue_date));
        self.profiles
            .lock()
            .unwrap()
            .insert(code.to_string(), profile(code, ten_year));
    }

    pub fn add_without_profile(&self, code: &str, issue_date: NaiveDate) {
        self.bonds.lock().unwrap().push(bond(code, issue_date));
    }
}

#[async_trait]
impl BondSource for FakeBonds {
    async fn list_bonds(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_count: usize,
        _order: SortOrder,
    ) -> Result<Vec<SavingsBond>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BotError::UpstreamUnavailable("status code 503".into()));
        }
        Ok(self
            .bonds
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.issue_date >= start && b.issue_date <= end)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn get_interest_profile(&self, issue_code: &str) -> Result<BondInterestProfile> {
        self.profiles
            .lock()
            .unwrap()
            .get(issue_code)
            .cloned()
            .ok_or_else(|| BotError::NotFound {
                issue_code: issue_code.to_string(),
            })
    }
}

/// Encodes the chart data as text so tests can inspect what would be plotted.
pub struct TextRenderer;

impl ChartRenderer for TextRenderer {
    fn render(&self, data: &ChartData) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(BotError::RenderError("cannot plot an empty series".into()));
        }
        let points: Vec<String> = data
            .labels
            .iter()
            .zip(&data.values)
            .map(|(label, value)| format!("{}={:.2}", label, value))
            .collect();
        Ok(points.join(";").into_bytes())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<ChatId, RecipientSubscription>>,
    pub fail_reads: AtomicBool,
    pub fail_writes_for: Mutex<HashSet<ChatId>>,
}

impl MemoryStore {
    pub fn subscribe(&self, chat_id: ChatId, last: Option<Cycle>) {
        let mut sub = RecipientSubscription::new(chat_id);
        sub.subscribed = true;
        sub.last_notified_cycle = last;
        self.records.lock().unwrap().insert(chat_id, sub);
    }

    pub fn set_unsubscribed(&self, chat_id: ChatId) {
        if let Some(sub) = self.records.lock().unwrap().get_mut(&chat_id) {
            sub.subscribed = false;
        }
    }

    pub fn record(&self, chat_id: ChatId) -> Option<RecipientSubscription> {
        self.records.lock().unwrap().get(&chat_id).cloned()
    }

    pub fn marker(&self, chat_id: ChatId) -> Option<Cycle> {
        self.record(chat_id).and_then(|s| s.last_notified_cycle)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<RecipientSubscription>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BotError::StoreFailure("connection refused".into()));
        }
        Ok(self.record(chat_id))
    }

    async fn insert(&self, subscription: &RecipientSubscription) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(subscription.chat_id, subscription.clone());
        Ok(())
    }

    async fn set_subscribed(&self, chat_id: ChatId, subscribed: bool) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let sub = records
            .get_mut(&chat_id)
            .ok_or_else(|| BotError::StoreFailure("missing".into()))?;
        sub.subscribed = subscribed;
        Ok(())
    }

    async fn mark_notified(&self, chat_id: ChatId, cycle: Cycle, at: NaiveDateTime) -> Result<()> {
        if self.fail_writes_for.lock().unwrap().contains(&chat_id) {
            return Err(BotError::StoreFailure("write rejected".into()));
        }
        let mut records = self.records.lock().unwrap();
        let sub = records
            .get_mut(&chat_id)
            .ok_or_else(|| BotError::StoreFailure("missing".into()))?;
        sub.mark_notified(cycle, at);
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId) -> Result<()> {
        self.records.lock().unwrap().remove(&chat_id);
        Ok(())
    }

    async fn list_pending(&self, cycle: Cycle) -> Result<Vec<RecipientSubscription>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BotError::StoreFailure("connection refused".into()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.needs_notification(cycle))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeDispatcher {
    pub reports: Mutex<Vec<Report>>,
    pub texts: Mutex<Vec<(ChatId, String)>>,
    pub fail_for: Mutex<HashSet<ChatId>>,
}

impl FakeDispatcher {
    pub fn reports_for(&self, chat_id: ChatId) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn send_report(&self, report: &Report) -> Result<()> {
        if self.fail_for.lock().unwrap().contains(&report.chat_id) {
            return Err(BotError::DeliveryFailure("Forbidden: bot was blocked by the user".into()));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.texts.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    let vars: HashMap<&str, &str> = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("DIRECTUS_HOST", "http://localhost:8055"),
        ("DIRECTUS_TOKEN", "token"),
        ("MAX_CONCURRENT_DISPATCHES", "3"),
    ]
    .into_iter()
    .collect();
    AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub struct Harness {
    pub bonds: Arc<FakeBonds>,
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub reports: Arc<ReportGenerator>,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new() -> Self {
        let bonds = Arc::new(FakeBonds::default());
        let store = Arc::new(MemoryStore::default());
        let dispatcher = Arc::new(FakeDispatcher::default());
        let reports = Arc::new(ReportGenerator::new(bonds.clone(), Arc::new(TextRenderer)));
        let scheduler = Scheduler::new(
            &test_config(),
            reports.clone(),
            store.clone(),
            dispatcher.clone(),
        );
        Harness {
            bonds,
            store,
            dispatcher,
            reports,
            scheduler,
        }
    }
}
