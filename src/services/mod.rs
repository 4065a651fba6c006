// Pipeline stages
pub mod cleaning;
pub mod diagnostics;
pub mod forecasting;

// Datastore seams
pub mod data_source;
pub mod result_store;

// Orchestration
pub mod pipeline;
