// Market data processing modules
pub mod indicators;

use crate::domain::types::PriceBar;

/// Aggregates a daily price series into calendar-month bars.
///
/// Open is the first bar of the month, high/low the extremes, close the
/// last bar, volume the sum; the bar carries the date of the last trading
/// day seen in that month. Input must be date-ordered.
pub fn resample_monthly(daily: &[PriceBar]) -> Vec<PriceBar> {
    use chrono::Datelike;

    let mut monthly: Vec<PriceBar> = Vec::new();
    let mut current: Option<PriceBar> = None;
    let mut current_month: Option<(i32, u32)> = None;

    for bar in daily {
        let month = (bar.date.year(), bar.date.month());
        if current_month == Some(month) {
            if let Some(agg) = current.as_mut() {
                agg.date = bar.date;
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
        } else {
            if let Some(done) = current.take() {
                monthly.push(done);
            }
            current = Some(*bar);
            current_month = Some(month);
        }
    }
    if let Some(done) = current {
        monthly.push(done);
    }
    monthly
}
