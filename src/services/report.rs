// src/services/report.rs
use log::{debug, info};
use std::sync::Arc;

use crate::error::{BotError, Result};
use crate::models::{
    BondInterestProfile, BondSeries, ChatId, Cycle, Report, ReportWindow, SavingsBond,
};
use crate::services::bonds::{BondSource, SortOrder};
use crate::services::chart::{ChartData, ChartRenderer};
use crate::services::dates::caption_date;

/// Thirteen monthly tranches: a year of history plus the newly announced one.
pub const REPORT_BOND_COUNT: usize = 13;

/// Characters Telegram MarkdownV2 only accepts when preceded by a backslash.
const MARKDOWN_RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if MARKDOWN_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn percent(value: f64) -> String {
    escape_markdown(&format!("{:.2}%", value))
}

/// MarkdownV2 summary of one bond. Template text is pre-escaped; every
/// interpolated value goes through `escape_markdown`.
pub fn format_caption(bond: &SavingsBond, profile: &BondInterestProfile) -> String {
    let payment_months = bond
        .payment_month
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "*Singapore Savings Bond {code}*\n\
         \n\
         Issue date: {issue}\n\
         Maturity date: {maturity}\n\
         Last day to apply: {last_day}\n\
         1\\-year average return: {one_year}\n\
         10\\-year average return: {ten_year}\n\
         First interest date: {first_interest}\n\
         Interest payment months: {payment_months}\n\
         Issue size: S${issue_size} million",
        code = escape_markdown(&bond.issue_code),
        issue = escape_markdown(&caption_date(bond.issue_date)),
        maturity = escape_markdown(&caption_date(bond.maturity_date)),
        last_day = escape_markdown(&caption_date(bond.last_day_to_apply)),
        one_year = percent(profile.one_year_average_return()),
        ten_year = percent(profile.ten_year_average_return()),
        first_interest = escape_markdown(&caption_date(bond.first_interest_date)),
        payment_months = escape_markdown(&payment_months),
        issue_size = escape_markdown(&bond.issue_size.to_string()),
    )
}

/// Fetches bonds, shapes them into a series and renders the deliverable.
pub struct ReportGenerator {
    source: Arc<dyn BondSource>,
    renderer: Arc<dyn ChartRenderer>,
}

impl ReportGenerator {
    pub fn new(source: Arc<dyn BondSource>, renderer: Arc<dyn ChartRenderer>) -> Self {
        ReportGenerator { source, renderer }
    }

    /// Newest bonds first, so the row limit never drops the latest tranche.
    pub async fn fetch_recent_bonds(&self, window: ReportWindow) -> Result<Vec<SavingsBond>> {
        self.source
            .list_bonds(window.start, window.end, REPORT_BOND_COUNT, SortOrder::Descending)
            .await
    }

    /// Resolves a profile for every bond, stopping at the first failure.
    pub async fn build_series(&self, raw_bonds: Vec<SavingsBond>) -> Result<BondSeries> {
        let mut entries = Vec::with_capacity(raw_bonds.len());
        for bond in raw_bonds {
            let profile = self.source.get_interest_profile(&bond.issue_code).await?;
            debug!(
                "{} issued {} returns {:.2}% over 10 years",
                bond.issue_code,
                bond.issue_date,
                profile.ten_year_average_return()
            );
            entries.push((bond, profile));
        }
        BondSeries::new(entries)
    }

    pub async fn render_chart(&self, series: &BondSeries) -> Result<Vec<u8>> {
        let data = ChartData::from_series(series);
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || renderer.render(&data))
            .await
            .map_err(|e| BotError::RenderError(format!("render task failed: {}", e)))?
    }

    /// The bond with the latest issue date in the window, if any.
    pub async fn latest_bond(&self, window: ReportWindow) -> Result<Option<SavingsBond>> {
        let bonds = self.fetch_recent_bonds(window).await?;
        Ok(bonds.into_iter().max_by_key(|bond| bond.issue_date))
    }

    /// Latest bond together with its interest profile.
    pub async fn latest_with_profile(
        &self,
        window: ReportWindow,
    ) -> Result<Option<(SavingsBond, BondInterestProfile)>> {
        match self.latest_bond(window).await? {
            Some(bond) => {
                let profile = self.source.get_interest_profile(&bond.issue_code).await?;
                Ok(Some((bond, profile)))
            }
            None => Ok(None),
        }
    }

    pub async fn build_report(&self, chat_id: ChatId, window: ReportWindow) -> Result<Report> {
        let raw_bonds = self.fetch_recent_bonds(window).await?;
        let series = self.build_series(raw_bonds).await?;
        let image = self.render_chart(&series).await?;

        let (bond, profile) = series
            .latest()
            .ok_or_else(|| BotError::RenderError("no bonds in report window".into()))?;
        info!(
            "Built report for chat {} with {} bonds, latest {}",
            chat_id,
            series.len(),
            bond.issue_code
        );

        Ok(Report {
            chat_id,
            image,
            caption: format_caption(bond, profile),
            latest_issue_code: bond.issue_code.clone(),
            latest_cycle: Cycle::of(bond.issue_date),
        })
    }
}
