use serde::{Deserialize, Serialize};

/// One published diagnostic reading, recorded for later saving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSample {
    /// Model time at which the reading was published (accumulated step size, not wall time).
    pub simulated_time: f64,
    /// The aggregate value read back from the backend (total energy of the grid).
    pub value: f64,
}
