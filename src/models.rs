// src/models.rs
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{BotError, Result};
use crate::services::dates::serialize_bond_date;

/// Telegram chat identifier. The subscription store keeps it as a string,
/// so the adapter is the only place that converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn to_store_key(self) -> String {
        self.0.to_string()
    }

    pub fn from_store_key(key: &str) -> Result<Self> {
        key.trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|e| BotError::StoreFailure(format!("invalid chat_id '{}': {}", key, e)))
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One notification period: a calendar month in the reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cycle {
    year: i32,
    month: u32,
}

impl Cycle {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Cycle { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Cycle {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The cycle `now` falls in, using whatever timezone `now` carries.
    pub fn current<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self::of(now.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Cycle {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BotError::MalformedResponse(format!("invalid cycle marker '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Cycle::new(year, month).ok_or_else(invalid)
    }
}

/// One Singapore Savings Bond tranche as published by MAS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsBond {
    pub issue_code: String,
    pub isin_code: Option<String>,
    pub auction_tenor: Option<u32>,
    pub issue_size: f64, // in millions of dollars
    pub amount_applied: Option<f64>,
    #[serde(serialize_with = "serialize_bond_date")]
    pub issue_date: NaiveDate,
    #[serde(serialize_with = "serialize_bond_date")]
    pub maturity_date: NaiveDate,
    #[serde(serialize_with = "serialize_bond_date")]
    pub last_day_to_apply: NaiveDate,
    #[serde(serialize_with = "serialize_bond_date")]
    pub first_interest_date: NaiveDate,
    pub payment_month: String, // e.g. "Mar,Sep"
}

pub const HOLDING_YEARS: usize = 10;

/// Coupon and average annual return for each holding year 1..=10.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BondInterestProfile {
    pub issue_code: String,
    pub coupons: [f64; HOLDING_YEARS],
    pub returns: [f64; HOLDING_YEARS],
}

impl BondInterestProfile {
    pub fn one_year_average_return(&self) -> f64 {
        self.returns[0]
    }

    pub fn ten_year_average_return(&self) -> f64 {
        self.returns[HOLDING_YEARS - 1]
    }
}

/// Bonds paired with their interest profiles, strictly ascending by issue date.
#[derive(Debug, Clone)]
pub struct BondSeries {
    entries: Vec<(SavingsBond, BondInterestProfile)>,
}

impl BondSeries {
    pub fn new(mut entries: Vec<(SavingsBond, BondInterestProfile)>) -> Result<Self> {
        let mut codes = HashSet::new();
        for (bond, profile) in &entries {
            if bond.issue_code != profile.issue_code {
                return Err(BotError::MalformedResponse(format!(
                    "interest profile {} paired with bond {}",
                    profile.issue_code, bond.issue_code
                )));
            }
            if !codes.insert(bond.issue_code.as_str()) {
                return Err(BotError::MalformedResponse(format!(
                    "duplicate issue code {}",
                    bond.issue_code
                )));
            }
        }

        entries.sort_by_key(|(bond, _)| bond.issue_date);
        if let Some(pair) = entries
            .windows(2)
            .find(|w| w[0].0.issue_date == w[1].0.issue_date)
        {
            return Err(BotError::MalformedResponse(format!(
                "bonds {} and {} share issue date {}",
                pair[0].0.issue_code, pair[1].0.issue_code, pair[0].0.issue_date
            )));
        }

        Ok(BondSeries { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SavingsBond, BondInterestProfile)> {
        self.entries.iter()
    }

    /// The most recently issued bond, chosen by issue date.
    pub fn latest(&self) -> Option<&(SavingsBond, BondInterestProfile)> {
        self.entries.iter().max_by_key(|(bond, _)| bond.issue_date)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipientSubscription {
    pub chat_id: ChatId,
    pub subscribed: bool,
    pub last_notified_cycle: Option<Cycle>,
    pub last_notification_time: Option<NaiveDateTime>,
}

impl RecipientSubscription {
    pub fn new(chat_id: ChatId) -> Self {
        RecipientSubscription {
            chat_id,
            subscribed: false,
            last_notified_cycle: None,
            last_notification_time: None,
        }
    }

    /// Active and not yet sent a bond issued in `cycle` or later.
    pub fn needs_notification(&self, cycle: Cycle) -> bool {
        self.subscribed && !self.has_received(cycle)
    }

    /// True once a bond issued in `cycle` or a later month was delivered.
    pub fn has_received(&self, cycle: Cycle) -> bool {
        self.last_notified_cycle.map_or(false, |last| last >= cycle)
    }

    /// Advances the marker. An older cycle never replaces a newer one.
    pub fn mark_notified(&mut self, cycle: Cycle, at: NaiveDateTime) {
        if self.last_notified_cycle.map_or(true, |current| cycle > current) {
            self.last_notified_cycle = Some(cycle);
            self.last_notification_time = Some(at);
        }
    }
}

/// Issue-date range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportWindow {
    /// Twelve months back and one month ahead, so a tranche announced for
    /// next month is already included.
    pub fn ending_after(today: NaiveDate) -> Self {
        ReportWindow {
            start: today.checked_sub_months(Months::new(12)).unwrap_or(today),
            end: today.checked_add_months(Months::new(1)).unwrap_or(today),
        }
    }
}

/// A rendered chart plus caption, ready to be delivered to one chat.
#[derive(Debug, Clone)]
pub struct Report {
    pub chat_id: ChatId,
    pub image: Vec<u8>,
    pub caption: String,
    pub latest_issue_code: String,
    /// Issue month of the latest bond; becomes the chat's marker once delivered.
    pub latest_cycle: Cycle,
}
