// src/handlers/bonds.rs
use chrono::Utc;
use chrono_tz::Tz;
use log::{error, info};
use serde_json::json;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use crate::models::ReportWindow;
use crate::services::report::ReportGenerator;

pub async fn get_health() -> Result<Json, Rejection> {
    Ok(warp::reply::json(&json!({ "status": "ok" })))
}

pub async fn get_latest_bond(reports: Arc<ReportGenerator>, timezone: Tz) -> Result<Json, Rejection> {
    info!("Handling request to get the latest savings bond.");

    let today = Utc::now().with_timezone(&timezone).date_naive();
    let latest = reports
        .latest_with_profile(ReportWindow::ending_after(today))
        .await
        .map_err(|e| {
            error!("Failed to fetch latest savings bond: {}", e);
            warp::reject::custom(ApiError::external_error(e.to_string()))
        })?;

    match latest {
        Some((bond, profile)) => Ok(warp::reply::json(&json!({
            "bond": bond,
            "interest": profile,
        }))),
        None => Err(warp::reject::custom(ApiError::not_found(
            "No savings bonds issued in the last year",
        ))),
    }
}
