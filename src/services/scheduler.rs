// src/services/scheduler.rs
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::error::{BotError, Result};
use crate::models::{ChatId, Cycle, RecipientSubscription, ReportWindow};
use crate::services::report::ReportGenerator;
use crate::services::subscriptions::SubscriptionStore;
use crate::services::telegram::Dispatcher;

/// What happened to one chat during a dispatch batch.
#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered { chat_id: ChatId, issue_code: String },
    /// The chat already has the newest bond; nothing was sent.
    UpToDate { chat_id: ChatId, issue_code: String },
    Failed { chat_id: ChatId, error: BotError },
}

/// Result of one poll pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassSummary {
    /// The store could not be read; nothing was attempted.
    Skipped,
    NothingPending,
    /// The cycle's bond is not out yet; chats stay eligible.
    NotPublished,
    Dispatched { delivered: usize, failed: usize },
}

/// Polls for chats that missed the current cycle and sends each one a report.
pub struct Scheduler {
    reports: Arc<ReportGenerator>,
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Arc<dyn Dispatcher>,
    timezone: Tz,
    poll_interval: Duration,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(
        config: &AppConfig,
        reports: Arc<ReportGenerator>,
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Scheduler {
            reports,
            store,
            dispatcher,
            timezone: config.timezone,
            poll_interval: config.poll_interval,
            max_concurrent: config.max_concurrent_dispatches.max(1),
        }
    }

    pub async fn run(&self) {
        info!(
            "Scheduler started, polling every {:?} in {}",
            self.poll_interval, self.timezone
        );
        loop {
            let now = Utc::now().with_timezone(&self.timezone);
            let summary = self.run_pass(now).await;
            debug!("Pass finished: {:?}", summary);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// A single pass at `now`; `run` calls this once per poll interval.
    pub async fn run_pass(&self, now: DateTime<Tz>) -> PassSummary {
        let cycle = Cycle::current(&now);

        let pending = match self.pending_recipients(cycle).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to read chats to notify for {}: {}", cycle, e);
                return PassSummary::Skipped;
            }
        };
        if pending.is_empty() {
            debug!("No chats pending for {}", cycle);
            return PassSummary::NothingPending;
        }
        info!("{} chats pending for cycle {}", pending.len(), cycle);

        let window = ReportWindow::ending_after(now.date_naive());
        match self.is_published(cycle, window).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Savings bond for {} not published yet", cycle);
                return PassSummary::NotPublished;
            }
            Err(e) => {
                warn!("Could not check publication for {}: {}", cycle, e);
                return PassSummary::NotPublished;
            }
        }

        let (outcomes, aborted) = self
            .dispatch_all(pending, window, now.naive_local())
            .await;
        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Delivered { .. }))
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Failed { .. }))
            .count()
            + aborted;
        info!(
            "Cycle {}: delivered {} reports, {} failed",
            cycle, delivered, failed
        );
        PassSummary::Dispatched { delivered, failed }
    }

    async fn pending_recipients(&self, cycle: Cycle) -> Result<Vec<RecipientSubscription>> {
        let mut pending = self.store.list_pending(cycle).await?;
        // re-check locally, the store filter may lag the record shape
        pending.retain(|sub| sub.needs_notification(cycle));
        pending.sort_by_key(|sub| sub.chat_id);
        pending.dedup_by_key(|sub| sub.chat_id);
        Ok(pending)
    }

    /// The cycle counts as published once a bond issued in it (or later) is listed.
    async fn is_published(&self, cycle: Cycle, window: ReportWindow) -> Result<bool> {
        let latest = self.reports.latest_bond(window).await?;
        Ok(latest.map_or(false, |bond| Cycle::of(bond.issue_date) >= cycle))
    }

    async fn dispatch_all(
        &self,
        recipients: Vec<RecipientSubscription>,
        window: ReportWindow,
        at: NaiveDateTime,
    ) -> (Vec<DispatchOutcome>, usize) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for recipient in recipients {
            let chat_id = recipient.chat_id;
            let permits = Arc::clone(&permits);
            let reports = Arc::clone(&self.reports);
            let store = Arc::clone(&self.store);
            let dispatcher = Arc::clone(&self.dispatcher);

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return DispatchOutcome::Failed {
                            chat_id,
                            error: BotError::DeliveryFailure(e.to_string()),
                        }
                    }
                };
                notify_recipient(&reports, &*store, &*dispatcher, &recipient, window, at)
                    .await
                    .unwrap_or_else(|error| DispatchOutcome::Failed { chat_id, error })
            });
        }

        let mut outcomes = Vec::new();
        let mut aborted = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(DispatchOutcome::Delivered { chat_id, issue_code }) => {
                    info!("Sent {} to chat {}", issue_code, chat_id);
                    outcomes.push(DispatchOutcome::Delivered { chat_id, issue_code });
                }
                Ok(DispatchOutcome::UpToDate { chat_id, issue_code }) => {
                    debug!("Chat {} already has {}", chat_id, issue_code);
                    outcomes.push(DispatchOutcome::UpToDate { chat_id, issue_code });
                }
                Ok(DispatchOutcome::Failed { chat_id, error }) => {
                    warn!("Chat {} not notified, will retry next pass: {}", chat_id, error);
                    outcomes.push(DispatchOutcome::Failed { chat_id, error });
                }
                Err(e) => {
                    error!("Dispatch task aborted: {}", e);
                    aborted += 1;
                }
            }
        }
        (outcomes, aborted)
    }
}

/// Builds, delivers and records one chat's report. The marker only moves
/// after delivery, and it moves to the issue month of the bond that was sent.
async fn notify_recipient(
    reports: &ReportGenerator,
    store: &dyn SubscriptionStore,
    dispatcher: &dyn Dispatcher,
    recipient: &RecipientSubscription,
    window: ReportWindow,
    at: NaiveDateTime,
) -> Result<DispatchOutcome> {
    let chat_id = recipient.chat_id;
    let report = reports.build_report(chat_id, window).await?;
    if recipient.has_received(report.latest_cycle) {
        return Ok(DispatchOutcome::UpToDate {
            chat_id,
            issue_code: report.latest_issue_code,
        });
    }
    dispatcher.send_report(&report).await?;
    store.mark_notified(chat_id, report.latest_cycle, at).await?;
    Ok(DispatchOutcome::Delivered {
        chat_id,
        issue_code: report.latest_issue_code,
    })
}
