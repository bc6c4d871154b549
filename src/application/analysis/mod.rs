// Trend scoring and prediction adjustment
pub mod trend;
