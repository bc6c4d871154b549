// CSV-backed market data source
pub mod market_data;

// Trained-model artifact persistence
pub mod persistence;
