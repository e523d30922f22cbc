// src/services/dates.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serializer;

use crate::error::{BotError, Result};

/// Layout MAS uses for every date field, e.g. "2024-09-02 00:00:00".
pub const BOND_DATE_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";
/// Layout for the issue_date filter in list queries.
pub const QUERY_DATE_LAYOUT: &str = "%Y-%m-%d";
/// Directus stores timestamps without a timezone.
pub const STORE_TIMESTAMP_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";
pub const CHART_LABEL_LAYOUT: &str = "%b %y";
pub const CAPTION_DATE_LAYOUT: &str = "%d %b %Y";

pub fn parse_bond_date(raw: &str) -> Result<NaiveDate> {
    NaiveDateTime::parse_from_str(raw.trim(), BOND_DATE_LAYOUT)
        .map(|dt| dt.date())
        .map_err(|e| BotError::MalformedResponse(format!("bad bond date '{}': {}", raw, e)))
}

pub fn format_bond_date(date: NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.format(BOND_DATE_LAYOUT).to_string())
        .unwrap_or_default()
}

/// Serde hook so bonds leave the HTTP surface in the same layout MAS sends.
pub fn serialize_bond_date<S: Serializer>(
    date: &NaiveDate,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_bond_date(*date))
}

pub fn format_query_date(date: NaiveDate) -> String {
    date.format(QUERY_DATE_LAYOUT).to_string()
}

pub fn parse_store_timestamp(raw: &str) -> Result<NaiveDateTime> {
    // Directus may append fractional seconds or a zone suffix; only the first 19 chars matter.
    let trimmed = raw.trim();
    let head = trimmed.get(..19).unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(head, STORE_TIMESTAMP_LAYOUT)
        .map_err(|e| BotError::StoreFailure(format!("bad timestamp '{}': {}", raw, e)))
}

pub fn format_store_timestamp(at: NaiveDateTime) -> String {
    at.format(STORE_TIMESTAMP_LAYOUT).to_string()
}

pub fn chart_label(date: NaiveDate) -> String {
    date.format(CHART_LABEL_LAYOUT).to_string()
}

pub fn caption_date(date: NaiveDate) -> String {
    date.format(CAPTION_DATE_LAYOUT).to_string()
}
