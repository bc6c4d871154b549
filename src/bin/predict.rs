use anyhow::{Context, Result, bail};
use clap::Parser;
use fundcast::application::advisor::AllocationAdvisor;
use fundcast::config::AdvisorConfig;
use fundcast::domain::ports::MarketDataSource;
use fundcast::infrastructure::market_data::CsvMarketData;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Next-month allocation recommendation")]
struct Cli {
    /// Path to the daily price CSV (Date,Open,High,Low,Close,Volume)
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the trained model artifact
    #[arg(long, default_value = "models/ensemble.json")]
    model: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();

    let mut config = AdvisorConfig::from_env().context("invalid configuration")?;
    config.model_path = cli.model;

    let bars = CsvMarketData::new(cli.input)
        .daily_bars()
        .context("failed to load price series")?;

    let advisor = AllocationAdvisor::new(config);
    if !advisor.load().context("failed to load model artifact")? {
        bail!("no trained model found; run the train binary first");
    }

    let adjusted = advisor
        .predict_with_adjustment(&bars)
        .context("prediction failed")?;
    let context = advisor.market_context(&bars);
    let decision = advisor.compute_allocation(adjusted.prediction, adjusted.confidence, context);

    println!("\n══════════════════════════════════════════");
    println!("  ALLOCATION RECOMMENDATION");
    println!("══════════════════════════════════════════");
    println!(
        "  Prediction:   {}  ({:.1}% confidence)",
        adjusted.prediction,
        adjusted.confidence * 100.0
    );
    println!(
        "  Base model:   {}  ({:.1}% confidence){}",
        adjusted.base_prediction,
        adjusted.base_confidence * 100.0,
        if adjusted.changed { "  [adjusted]" } else { "" }
    );
    println!(
        "  Signal votes: {} bullish / {} bearish",
        adjusted.bullish_votes, adjusted.bearish_votes
    );
    println!("  Trend score:  {:.0}/100", adjusted.trend.trend_score);
    println!(
        "  Momentum:     3m {:+.1}%, 6m {:+.1}%",
        adjusted.trend.momentum_3m_pct, adjusted.trend.momentum_6m_pct
    );
    println!("  Drawdown:     {:.1}%", adjusted.trend.drawdown_pct);
    println!("  Volatility:   {:.1}%", adjusted.trend.volatility_pct);

    println!("\n  Equity allocation: {:.0}%", decision.allocation * 100.0);
    for reason in &decision.reasons {
        println!("    - {}", reason);
    }
    println!("══════════════════════════════════════════");

    Ok(())
}
