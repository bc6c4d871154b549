use anyhow::{Context, Result};
use clap::Parser;
use fundcast::application::advisor::AllocationAdvisor;
use fundcast::config::AdvisorConfig;
use fundcast::domain::ports::MarketDataSource;
use fundcast::infrastructure::market_data::CsvMarketData;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Train the allocation ensemble from a daily price CSV")]
struct Cli {
    /// Path to the daily price CSV (Date,Open,High,Low,Close,Volume)
    #[arg(short, long)]
    input: PathBuf,

    /// Path to write the trained model artifact
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
    println!("Loaded {} daily bars", bars.len());

    let advisor = AllocationAdvisor::new(config);
    let metrics = advisor.train(&bars).context("training failed")?;

    println!("\n══════════════════════════════════════════");
    println!("  TRAINING COMPLETE");
    println!("══════════════════════════════════════════");
    println!("  Train accuracy: {:.2}%  ({} samples)",
        metrics.train_accuracy * 100.0,
        metrics.train_samples
    );
    println!(
        "  Test accuracy:  {:.2}%  ({} samples)",
        metrics.test_accuracy * 100.0,
        metrics.test_samples
    );
    println!("  Precision:      {:.4}", metrics.precision);
    println!("  Recall:         {:.4}", metrics.recall);
    println!("  F1 score:       {:.4}", metrics.f1_score);
    println!("  Features used:  {}", metrics.features_used);

    println!("\n  Top features:");
    for feature in &metrics.top_features {
        println!("    {:<20} {:.4}", feature.name, feature.importance);
    }
    println!("══════════════════════════════════════════");

    Ok(())
}
