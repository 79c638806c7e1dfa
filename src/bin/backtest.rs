use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use trendbot::api::BinanceClient;
use trendbot::feed::convert_rows_to_candles;
use trendbot::models::{Candle, Interval, Signal};
use trendbot::strategy::{run_pipeline_once, SuperTrendConfig};

#[derive(Parser, Debug)]
#[command(name = "backtest", about = "Replay SuperTrend crossovers over recent history")]
struct Args {
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    #[arg(long, default_value = "15m")]
    interval: Interval,

    /// Number of klines to fetch (max 1000)
    #[arg(long, default_value_t = 500)]
    limit: usize,

    #[arg(long, default_value_t = 10)]
    atr_period: usize,

    #[arg(long, default_value_t = 3.0)]
    multiplier: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("trendbot=warn")
        .init();

    let args = Args::parse();
    let config = SuperTrendConfig {
        atr_period: args.atr_period,
        multiplier: args.multiplier,
    };
    config.validate()?;

    let client = BinanceClient::new()?;
    let rows = client
        .get_klines(&args.symbol, args.interval, args.limit)
        .await
        .context("Failed to fetch history")?;
    let candles = convert_rows_to_candles(&rows, Utc::now());

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          SUPERTREND CROSSOVER REPLAY                  ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!(
        "{} {} | {} closed candles | ATR({}) x {}\n",
        args.symbol,
        args.interval,
        candles.len(),
        config.atr_period,
        config.multiplier
    );

    let signals = replay(&candles, &config);
    print_signals(&signals);

    Ok(())
}

/// Run the pipeline on every growing prefix, as the live bot would have
fn replay<'a>(candles: &'a [Candle], config: &SuperTrendConfig) -> Vec<(&'a Candle, Signal, f64)> {
    let mut signals = Vec::new();

    for end in config.min_candles_required()..=candles.len() {
        match run_pipeline_once(&candles[..end], config) {
            Ok(output) if output.signal.is_actionable() => {
                let trend = output.last_trend().unwrap_or(f64::NAN);
                signals.push((&candles[end - 1], output.signal, trend));
            }
            Ok(_) => {}
            Err(e) => eprintln!("❌ Pass ending at bar {} failed: {}", end - 1, e),
        }
    }

    signals
}

fn print_signals(signals: &[(&Candle, Signal, f64)]) {
    println!(
        "{:<18} {:>6} {:>14} {:>14}",
        "Bar", "Signal", "Close", "Trend"
    );
    println!("{}", "─".repeat(56));

    for (candle, signal, trend) in signals {
        println!(
            "{:<18} {:>6} {:>14.4} {:>14.4}",
            candle.open_time.format("%Y-%m-%d %H:%M"),
            signal.to_string(),
            candle.close,
            trend
        );
    }

    let buys = signals.iter().filter(|(_, s, _)| *s == Signal::Buy).count();
    let sells = signals.len() - buys;

    println!("\n📊 {} signals ({} BUY, {} SELL)", signals.len(), buys, sells);

    // Round trips: each BUY closed by the next SELL
    let mut entry: Option<f64> = None;
    let mut total_return_pct = 0.0;
    let mut trades = 0;
    for (candle, signal, _) in signals {
        match (signal, entry) {
            (Signal::Buy, None) => entry = Some(candle.close),
            (Signal::Sell, Some(price)) => {
                total_return_pct += (candle.close - price) / price * 100.0;
                trades += 1;
                entry = None;
            }
            _ => {}
        }
    }

    if trades > 0 {
        println!(
            "   {} round trips, cumulative return {:+.2}%",
            trades, total_return_pct
        );
    }

    println!("\n═══════════════════════════════════════════════════════\n");
}
