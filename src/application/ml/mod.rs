// Ensemble classifier and the trained artifact it produces
pub mod ensemble;

// Feature standardization fit on the training split only
pub mod scaler;
