//! Trendora - Telegram crypto price-alert bot.
//!
//! Watches CoinGecko prices on a fixed cadence and notifies chats when
//! one of their registered target prices is reached.

mod config;
mod telegram;

use clap::Parser;
use config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use telegram::{TelegramNotifier, TrendoraBot};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trendora_engine::AlertEngine;
use trendora_market::CoinGecko;
use trendora_store::AlertStore;

/// Trendora CLI
#[derive(Parser, Debug)]
#[command(name = "trendora")]
#[command(about = "Telegram crypto price-alert bot", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Log level: trace, debug, info, warn, error (overrides config)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds between matching sweeps (overrides config)
    #[arg(long)]
    sweep_interval: Option<u64>,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Periodic sweep driver. A store hiccup skips the tick; the next tick
/// retries. Sweeps never overlap because ticks are awaited in sequence.
async fn run_sweep_loop(engine: Arc<AlertEngine>, store: AlertStore, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "starting sweep loop");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; wait a full interval instead.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(err) = store.ping().await {
            warn!(error = %err, "store unreachable, skipping sweep");
            continue;
        }
        if let Err(err) = engine.sweep().await {
            error!(error = %err, "sweep aborted");
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config);
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(secs) = args.sweep_interval {
        config.sweep.interval_secs = secs;
    }
    init_logging(&config.log_level);

    let token = match std::env::var("BOT_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => {
            error!("BOT_TOKEN is not set");
            std::process::exit(1);
        }
    };
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database_url.clone());
    let api_key = std::env::var("COINGECKO_API_KEY").ok().filter(|k| !k.is_empty());

    let store = match AlertStore::connect(&database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, url = %database_url, "failed to connect to the alert store");
            std::process::exit(1);
        }
    };
    info!(url = %database_url, "alert store connected");

    let market = match CoinGecko::new(config.market.to_market_config(api_key)) {
        Ok(market) => market,
        Err(err) => {
            error!(error = %err, "failed to build the market client");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(token);
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let engine = Arc::new(AlertEngine::new(
        store.clone(),
        Arc::new(market.clone()),
        notifier,
    ));

    tokio::spawn(run_sweep_loop(
        Arc::clone(&engine),
        store,
        Duration::from_secs(config.sweep.interval_secs),
    ));

    info!("starting Telegram dispatcher");
    Arc::new(TrendoraBot::new(bot, engine, market)).run().await;
}
