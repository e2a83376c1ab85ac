pub mod config;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use config::{BackendConfig, GridConfig, HeatConfig, InitialCondition, OutputConfig, RunConfig};
pub use sim_params::SimulationParameters;
pub use snapshot::DiagnosticSample;
