use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The scalar parameter set pushed to the backend as one unit.
///
/// Also the `[parameters]` table of the TOML configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Number of solver sub-steps the backend performs per tick.
    pub step_batch_size: u32,
    /// Diffusivity (kappa) of the heat equation.
    pub diffusivity: f32,
    /// Model time advanced by a single sub-step.
    pub step_size: f32,
    /// Lower bound of the colour scale used when rendering.
    pub min_bound: f32,
    /// Upper bound of the colour scale used when rendering.
    pub max_bound: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            step_batch_size: 100,
            diffusivity: 1.0,
            step_size: 3.0e-6,
            min_bound: 0.0,
            max_bound: 100.0,
        }
    }
}

impl SimulationParameters {
    /// Model time covered by one batch of sub-steps.
    pub fn batch_duration(&self) -> f64 {
        f64::from(self.step_size) * f64::from(self.step_batch_size)
    }

    /// Checks the invariants every parameter set pushed to a backend must hold.
    pub fn validate(&self) -> Result<()> {
        if self.step_batch_size == 0 {
            anyhow::bail!("step batch size must be at least 1.");
        }
        if !(self.diffusivity.is_finite() && self.diffusivity > 0.0) {
            anyhow::bail!("diffusivity must be positive, got {}.", self.diffusivity);
        }
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            anyhow::bail!("step size must be positive, got {}.", self.step_size);
        }
        if !(self.min_bound.is_finite() && self.max_bound.is_finite()) {
            anyhow::bail!("colour bounds must be finite.");
        }
        if self.min_bound >= self.max_bound {
            anyhow::bail!(
                "min bound ({}) must be below max bound ({}).",
                self.min_bound,
                self.max_bound
            );
        }
        Ok(())
    }
}
