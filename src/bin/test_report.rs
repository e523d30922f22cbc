// src/bin/test_report.rs
use chrono::Utc;
use dotenv::dotenv;
use log::{error, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use ssb_notifier::config::{DEFAULT_MAS_API_BASE, DEFAULT_TIMEZONE, DEFAULT_USER_AGENT};
use ssb_notifier::models::{ChatId, ReportWindow};
use ssb_notifier::services::bonds::BondDataClient;
use ssb_notifier::services::chart::PlottersRenderer;
use ssb_notifier::services::report::ReportGenerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    info!("Testing savings bond report generation...");

    let timezone: chrono_tz::Tz = DEFAULT_TIMEZONE
        .parse()
        .map_err(|e| anyhow::anyhow!("bad timezone: {}", e))?;
    let today = Utc::now().with_timezone(&timezone).date_naive();
    let window = ReportWindow::ending_after(today);

    let bonds = Arc::new(BondDataClient::with_base_url(DEFAULT_MAS_API_BASE, DEFAULT_USER_AGENT)?);
    let reports = ReportGenerator::new(bonds, Arc::new(PlottersRenderer));

    match reports.build_report(ChatId(0), window).await {
        Ok(report) => {
            let dir = Path::new("./tmp");
            fs::create_dir_all(dir)?;
            let file = dir.join("line-chart.png");
            fs::write(&file, &report.image)?;
            info!("SUCCESS: latest bond {}", report.latest_issue_code);
            info!("Chart written to {}", file.display());
            println!("{}", report.caption);
        }
        Err(e) => {
            error!("ERROR: Failed to build report: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
