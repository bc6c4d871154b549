use anyhow::{Context, Result, bail};
use clap::Parser;
use fundcast::application::advisor::AllocationAdvisor;
use fundcast::application::backtest::BacktestMode;
use fundcast::config::AdvisorConfig;
use fundcast::domain::ports::MarketDataSource;
use fundcast::infrastructure::market_data::CsvMarketData;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Walk-forward backtest of the allocation pipeline")]
struct Cli {
    /// Path to the daily price CSV (Date,Open,High,Low,Close,Volume)
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the trained model artifact
    #[arg(long, default_value = "models/ensemble.json")]
    model: PathBuf,

    /// Decision chain: "ensemble" or "adjusted"
    #[arg(long, default_value = "ensemble")]
    mode: String,

    /// Number of most recent periods to print
    #[arg(long, default_value_t = 12)]
    tail: usize,
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
    let mode = match cli.mode.to_lowercase().as_str() {
        "ensemble" => BacktestMode::Ensemble,
        "adjusted" => BacktestMode::TrendAdjusted,
        other => bail!("invalid mode: {}. Must be 'ensemble' or 'adjusted'", other),
    };

    let mut config = AdvisorConfig::from_env().context("invalid configuration")?;
    config.model_path = cli.model;

    let bars = CsvMarketData::new(cli.input)
        .daily_bars()
        .context("failed to load price series")?;

    let advisor = AllocationAdvisor::new(config);
    if !advisor.load().context("failed to load model artifact")? {
        bail!("no trained model found; run the train binary first");
    }

    let summary = advisor.backtest(&bars, mode).context("backtest failed")?;

    println!("\n══════════════════════════════════════════");
    println!("  WALK-FORWARD BACKTEST ({:?})", summary.mode);
    println!("══════════════════════════════════════════");
    println!(
        "  Period:          {} .. {}  ({} months)",
        summary.period.start, summary.period.end, summary.period.months
    );
    println!("  Strategy return: {:+.2}%", summary.returns.strategy_pct);
    println!("  Buy & hold:      {:+.2}%", summary.returns.buy_hold_pct);
    println!("  Excess:          {:+.2}%", summary.returns.excess_pct);
    println!(
        "  Win rate:        {:.1}%  ({}/{})",
        summary.metrics.win_rate_pct,
        summary.metrics.correct_periods,
        summary.metrics.total_periods
    );
    println!("  Sharpe ratio:    {:.2}", summary.metrics.sharpe_ratio);
    println!("  Max drawdown:    {:.2}%", summary.metrics.max_drawdown_pct);
    println!("  Volatility:      {:.2}%", summary.metrics.volatility_pct);
    println!(
        "  Allocation:      mean {:.0}%, min {:.0}%, max {:.0}%",
        summary.allocation_stats.mean * 100.0,
        summary.allocation_stats.min * 100.0,
        summary.allocation_stats.max * 100.0
    );
    println!("  Final capital:   {:.2}", summary.final_capital);

    if cli.tail > 0 {
        println!("\n  Recent periods:");
        println!("    {:<8} {:<8} {:<8} {:>6} {:>7} {:>9}", "month", "pred", "actual", "conf", "alloc", "capital");
        for record in summary.history.iter().rev().take(cli.tail).rev() {
            println!(
                "    {:<8} {:<8} {:<8} {:>5.0}% {:>6.0}% {:>9.0}",
                record.date.format("%Y-%m"),
                record.prediction.to_string(),
                record.actual.to_string(),
                record.confidence * 100.0,
                record.allocation * 100.0,
                record.capital
            );
        }
    }
    println!("══════════════════════════════════════════");

    Ok(())
}
