use thiserror::Error;

/// Errors raised by the prediction pipeline (training, inference,
/// backtesting). Each kind is a distinct failure category for callers;
/// the pipeline never substitutes a default prediction.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("insufficient data: {rows} usable rows, need at least {min}")]
    InsufficientData { rows: usize, min: usize },

    #[error("model not trained; call train first")]
    NotTrained,

    #[error("no valid data: every row was dropped by the missing-value filter")]
    NoValidData,

    #[error("model error: {reason}")]
    Model { reason: String },
}

/// Errors raised by market-data sources.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("data source failure: {reason}")]
    Source { reason: String },

    #[error("data source returned an empty price series")]
    Empty,
}
