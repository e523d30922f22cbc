// src/routes.rs
use chrono_tz::Tz;
use log::info;
use std::convert::Infallible;
use std::sync::Arc;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::bonds::{get_health, get_latest_bond};
use crate::handlers::error::ApiError;
use crate::services::report::ReportGenerator;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found";
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.as_str();
    } else {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error";
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(
    reports: Arc<ReportGenerator>,
    timezone: Tz,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let reports_filter = warp::any().map(move || reports.clone());
    let timezone_filter = warp::any().map(move || timezone);

    let health_route = warp::path!("api" / "v1" / "health")
        .and(warp::get())
        .and_then(get_health);

    let latest_bond_route = warp::path!("api" / "v1" / "bonds" / "latest")
        .and(warp::get())
        .and(reports_filter)
        .and(timezone_filter)
        .and_then(get_latest_bond);

    info!("All routes configured successfully.");

    health_route.or(latest_bond_route).recover(handle_rejection)
}
