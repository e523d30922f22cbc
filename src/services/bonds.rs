// src/services/bonds.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::error::{BotError, Result};
use crate::models::{BondInterestProfile, SavingsBond, HOLDING_YEARS};
use crate::services::dates::{format_query_date, parse_bond_date};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_query(self) -> &'static str {
        match self {
            SortOrder::Ascending => "issue_date asc",
            SortOrder::Descending => "issue_date desc",
        }
    }
}

/// Read access to bond issuances and their interest profiles.
#[async_trait]
pub trait BondSource: Send + Sync {
    async fn list_bonds(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_count: usize,
        order: SortOrder,
    ) -> Result<Vec<SavingsBond>>;

    async fn get_interest_profile(&self, issue_code: &str) -> Result<BondInterestProfile>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    result: ApiResult<T>,
}

#[derive(Debug, Deserialize)]
struct ApiResult<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawSavingsBond {
    issue_code: String,
    isin_code: Option<String>,
    auction_tenor: Option<u32>,
    issue_size: f64,
    amount_applied: Option<f64>,
    issue_date: String,
    maturity_date: String,
    last_day_to_apply: String,
    first_int_date: String,
    #[serde(default)]
    payment_month: Option<String>,
}

impl TryFrom<RawSavingsBond> for SavingsBond {
    type Error = BotError;

    fn try_from(raw: RawSavingsBond) -> Result<Self> {
        Ok(SavingsBond {
            issue_date: parse_bond_date(&raw.issue_date)?,
            maturity_date: parse_bond_date(&raw.maturity_date)?,
            last_day_to_apply: parse_bond_date(&raw.last_day_to_apply)?,
            first_interest_date: parse_bond_date(&raw.first_int_date)?,
            payment_month: raw.payment_month.unwrap_or_default(),
            issue_code: raw.issue_code,
            isin_code: raw.isin_code,
            auction_tenor: raw.auction_tenor,
            issue_size: raw.issue_size,
            amount_applied: raw.amount_applied,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBondInterest {
    issue_code: String,
    year1_coupon: f64,
    year1_return: f64,
    year2_coupon: f64,
    year2_return: f64,
    year3_coupon: f64,
    year3_return: f64,
    year4_coupon: f64,
    year4_return: f64,
    year5_coupon: f64,
    year5_return: f64,
    year6_coupon: f64,
    year6_return: f64,
    year7_coupon: f64,
    year7_return: f64,
    year8_coupon: f64,
    year8_return: f64,
    year9_coupon: f64,
    year9_return: f64,
    year10_coupon: f64,
    year10_return: f64,
}

impl From<RawBondInterest> for BondInterestProfile {
    fn from(raw: RawBondInterest) -> Self {
        let coupons: [f64; HOLDING_YEARS] = [
            raw.year1_coupon,
            raw.year2_coupon,
            raw.year3_coupon,
            raw.year4_coupon,
            raw.year5_coupon,
            raw.year6_coupon,
            raw.year7_coupon,
            raw.year8_coupon,
            raw.year9_coupon,
            raw.year10_coupon,
        ];
        let returns: [f64; HOLDING_YEARS] = [
            raw.year1_return,
            raw.year2_return,
            raw.year3_return,
            raw.year4_return,
            raw.year5_return,
            raw.year6_return,
            raw.year7_return,
            raw.year8_return,
            raw.year9_return,
            raw.year10_return,
        ];
        BondInterestProfile {
            issue_code: raw.issue_code,
            coupons,
            returns,
        }
    }
}

pub fn decode_bond_list(body: &str) -> Result<Vec<SavingsBond>> {
    let envelope: ApiEnvelope<RawSavingsBond> = serde_json::from_str(body)
        .map_err(|e| BotError::MalformedResponse(format!("bond list: {}", e)))?;
    envelope
        .result
        .records
        .into_iter()
        .map(SavingsBond::try_from)
        .collect()
}

pub fn decode_interest_profile(issue_code: &str, body: &str) -> Result<BondInterestProfile> {
    let envelope: ApiEnvelope<RawBondInterest> = serde_json::from_str(body)
        .map_err(|e| BotError::MalformedResponse(format!("interest profile: {}", e)))?;
    envelope
        .result
        .records
        .into_iter()
        .next()
        .map(BondInterestProfile::from)
        .ok_or_else(|| BotError::NotFound {
            issue_code: issue_code.to_string(),
        })
}

/// Client for the MAS savings bond statistics API.
#[derive(Clone)]
pub struct BondDataClient {
    client: Client,
    base_url: String,
}

impl BondDataClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_base_url(&config.mas_api_base, &config.user_agent)
    }

    pub fn with_base_url(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| BotError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(BondDataClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        debug!("querying {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| BotError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::UpstreamUnavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(BotError::UpstreamUnavailable(format!(
                "status code {} from MAS API: {}",
                status, body
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl BondSource for BondDataClient {
    async fn list_bonds(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_count: usize,
        order: SortOrder,
    ) -> Result<Vec<SavingsBond>> {
        let url = format!("{}/listsavingbonds", self.base_url);
        let query = [
            ("rows", max_count.to_string()),
            (
                "filters",
                format!(
                    "issue_date:[{} TO {}]",
                    format_query_date(start),
                    format_query_date(end)
                ),
            ),
            ("sort", order.as_query().to_string()),
        ];
        let body = self.get_text(&url, &query).await?;
        let bonds = decode_bond_list(&body)?;
        info!(
            "Fetched {} savings bonds issued between {} and {}",
            bonds.len(),
            start,
            end
        );
        Ok(bonds)
    }

    async fn get_interest_profile(&self, issue_code: &str) -> Result<BondInterestProfile> {
        let url = format!("{}/savingbondsinterest", self.base_url);
        let query = [("filters", format!("issue_code:{}", issue_code))];
        let body = self.get_text(&url, &query).await?;
        decode_interest_profile(issue_code, &body)
    }
}
