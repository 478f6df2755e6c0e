pub mod evaluation;
pub mod history;
pub mod scaler;
pub mod stats;
