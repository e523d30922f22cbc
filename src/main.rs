use dotenv::dotenv;
use log::{error, info};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use ssb_notifier::config::AppConfig;
use ssb_notifier::handlers::commands::BotContext;
use ssb_notifier::handlers::updates::run_update_loop;
use ssb_notifier::routes;
use ssb_notifier::services::bonds::BondDataClient;
use ssb_notifier::services::chart::PlottersRenderer;
use ssb_notifier::services::report::ReportGenerator;
use ssb_notifier::services::scheduler::Scheduler;
use ssb_notifier::services::subscriptions::DirectusStore;
use ssb_notifier::services::telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv() {
        eprintln!("Error loading .env file: {}. Using environment variables instead...", e);
    }

    // RUST_LOG wins over LOG_LEVEL
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
    info!("Logger initialized. Starting the application...");

    let config = Arc::new(AppConfig::from_env()?);
    info!("Using timezone {} and port {}", config.timezone, config.port);

    let bonds = Arc::new(BondDataClient::new(&config)?);
    let reports = Arc::new(ReportGenerator::new(bonds, Arc::new(PlottersRenderer)));
    let store = Arc::new(DirectusStore::new(&config));
    let telegram = Arc::new(TelegramClient::new(&config));

    let scheduler = Scheduler::new(&config, reports.clone(), store.clone(), telegram.clone());
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let ctx = Arc::new(BotContext {
        config: config.clone(),
        store,
        dispatcher: telegram.clone(),
        reports: reports.clone(),
    });
    let updates_task = tokio::spawn(run_update_loop(ctx, telegram));

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET"]);
    let api = routes::routes(reports, config.timezone).with(cors);

    info!("Starting server on {}", addr);
    let server = warp::serve(api).run(addr);

    tokio::select! {
        _ = server => error!("HTTP server stopped"),
        res = scheduler_task => error!("Scheduler stopped: {:?}", res),
        res = updates_task => error!("Update loop stopped: {:?}", res),
    }
    Ok(())
}
