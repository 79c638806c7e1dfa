use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use trendbot::api::BinanceClient;
use trendbot::config::Settings;
use trendbot::execution::{DryRunExecutor, Scheduler, TracingDecisionLog};
use trendbot::models::Interval;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trendbot", about = "SuperTrend crossover signal bot")]
struct Cli {
    /// Settings file (defaults to ./trendbot.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trading pair, e.g. BTCUSDT
    #[arg(long)]
    symbol: Option<String>,

    /// Kline interval, e.g. 15m
    #[arg(long)]
    interval: Option<Interval>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    tracing::info!("🚀 TrendBot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {}", settings.symbol);
    tracing::info!("  Interval: {}", settings.interval);
    tracing::info!(
        "  SuperTrend: ATR({}) x {}",
        settings.atr_period,
        settings.multiplier
    );
    tracing::info!("  Candles per fetch: {}", settings.candle_limit);
    match settings.max_fetch_attempts {
        Some(n) => tracing::info!("  Fetch retries: every {}s, {} attempts", settings.retry_delay_secs, n),
        None => tracing::info!("  Fetch retries: every {}s, until success", settings.retry_delay_secs),
    }

    let client = BinanceClient::with_base_url(&settings.api_base_url, settings.requests_per_minute)?;
    let scheduler = Scheduler::new(
        client,
        DryRunExecutor,
        TracingDecisionLog,
        settings.scheduler(),
    );

    if cli.once {
        match scheduler.run_pass().await {
            Ok(signal) => tracing::info!("Signal: {}", signal),
            Err(e) => tracing::warn!("No signal: {}", e),
        }
        return Ok(());
    }

    tracing::info!("\nPress Ctrl+C to stop...\n");

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    tracing::info!("👋 TrendBot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    if let Some(symbol) = &cli.symbol {
        settings.symbol = symbol.clone();
    }
    if let Some(interval) = cli.interval {
        settings.interval = interval;
    }

    settings.validate()?;
    Ok(settings)
}
