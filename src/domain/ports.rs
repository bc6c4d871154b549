use crate::domain::errors::DataError;
use crate::domain::types::PriceBar;

/// Source of historical daily price bars for a ticker.
///
/// Implementations must return bars strictly ordered by date. The core
/// surfaces source failures as-is and never retries internally.
pub trait MarketDataSource: Send + Sync {
    fn daily_bars(&self) -> Result<Vec<PriceBar>, DataError>;
}
