//! Parameter store and the grid spacing <-> grid dimension derivations.
//!
//! Edits land in a draft. The draft only reaches the backend through
//! [`ParameterStore::apply`], which replaces the applied set wholesale.
//! Geometry edits are pairs of views on one quantity: the last edited view
//! wins and its partner is recomputed.

use crate::error::{DriverError, DriverResult};
use heat_common::HeatConfig;
use log::debug;

pub use heat_common::SimulationParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Whether the two axes are edited independently or share one spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryMode {
    #[default]
    Independent,
    Square,
}

/// Grid dimensions together with their reciprocal spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub width: u32,
    pub height: u32,
    pub spacing_x: f64,
    pub spacing_y: f64,
}

impl GridGeometry {
    /// Geometry whose spacings are derived from the given dimensions.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            spacing_x: spacing_for(width),
            spacing_y: spacing_for(height),
        }
    }

    pub fn dimension(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
        }
    }

    pub fn spacing(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.spacing_x,
            Axis::Y => self.spacing_y,
        }
    }

    fn set_axis(&mut self, axis: Axis, dimension: u32, spacing: f64) {
        match axis {
            Axis::X => {
                self.width = dimension;
                self.spacing_x = spacing;
            }
            Axis::Y => {
                self.height = dimension;
                self.spacing_y = spacing;
            }
        }
    }

    /// Display form used by the UI sink, e.g. `"256x128"`.
    pub fn shape_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Spacing of a unit-length axis split into `dimension` cells.
pub fn spacing_for(dimension: u32) -> f64 {
    1.0 / f64::from(dimension.max(1))
}

/// Number of whole cells of size `spacing` in a unit-length axis, at least 1.
///
/// Returns `None` when the spacing is not a positive finite number.
pub fn dimension_for(spacing: f64) -> Option<u32> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return None;
    }
    let cells = clamp_count(1.0 / spacing);
    Some(u32::try_from(cells).unwrap_or(u32::MAX))
}

/// Floors a raw integer-box value and clamps it to a minimum of 1.
pub fn clamp_count(raw: f64) -> u64 {
    if !(raw >= 1.0) {
        return 1; // Also catches NaN
    }
    raw.floor() as u64 // Saturates for huge values
}

/// Largest step size the explicit scheme tolerates, scaled by `safety_factor`.
pub fn stable_step_size(safety_factor: f64, diffusivity: f64, width: u32, height: u32) -> f64 {
    let w = f64::from(width);
    let h = f64::from(height);
    safety_factor / (2.0 * diffusivity * (w * w + h * h))
}

/// Number of sub-steps needed to cover `target_time`, at least 1.
pub fn step_budget_for(target_time: f64, step_size: f64) -> u64 {
    clamp_count((target_time / step_size).ceil())
}

/// Current parameters, their pending edits and the derived geometry display values.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    draft: SimulationParameters,
    applied: SimulationParameters,
    draft_max_step_count: u64,
    max_step_count: u64,
    geometry: GridGeometry,
    mode: GeometryMode,
    safety_factor: f64,
}

impl ParameterStore {
    pub fn new(
        params: SimulationParameters,
        max_step_count: u64,
        geometry: GridGeometry,
        mode: GeometryMode,
    ) -> Self {
        let max_step_count = max_step_count.max(1);
        Self {
            draft: params,
            applied: params,
            draft_max_step_count: max_step_count,
            max_step_count,
            geometry,
            mode,
            safety_factor: 0.9,
        }
    }

    pub fn from_config(config: &HeatConfig) -> Self {
        let mode = if config.grid.square {
            GeometryMode::Square
        } else {
            GeometryMode::Independent
        };
        let mut store = Self::new(
            config.to_parameters(),
            config.run.max_step_count,
            GridGeometry::from_dimensions(config.grid.width, config.grid.height),
            mode,
        );
        store.safety_factor = config.run.safety_factor;
        store
    }

    /// Parameters as edited, not yet pushed.
    pub fn draft(&self) -> &SimulationParameters {
        &self.draft
    }

    /// Parameters last pushed to the backend.
    pub fn applied(&self) -> &SimulationParameters {
        &self.applied
    }

    /// Step budget of the current run.
    pub fn max_step_count(&self) -> u64 {
        self.max_step_count
    }

    pub fn draft_max_step_count(&self) -> u64 {
        self.draft_max_step_count
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn mode(&self) -> GeometryMode {
        self.mode
    }

    pub fn safety_factor(&self) -> f64 {
        self.safety_factor
    }

    // --- Integer-only fields ---

    pub fn set_step_batch_size(&mut self, raw: f64) -> u32 {
        let batch = u32::try_from(clamp_count(raw)).unwrap_or(u32::MAX);
        self.draft.step_batch_size = batch;
        batch
    }

    pub fn set_max_step_count(&mut self, raw: f64) -> u64 {
        self.draft_max_step_count = clamp_count(raw);
        self.draft_max_step_count
    }

    // --- Real-valued fields (checked on apply) ---

    pub fn set_diffusivity(&mut self, diffusivity: f32) {
        self.draft.diffusivity = diffusivity;
    }

    pub fn set_step_size(&mut self, step_size: f32) {
        self.draft.step_size = step_size;
    }

    pub fn set_bounds(&mut self, min_bound: f32, max_bound: f32) {
        self.draft.min_bound = min_bound;
        self.draft.max_bound = max_bound;
    }

    pub fn set_safety_factor(&mut self, safety_factor: f64) -> DriverResult<()> {
        if !(safety_factor.is_finite() && safety_factor > 0.0) {
            return Err(DriverError::UserInput(format!(
                "safety factor must be positive, got {safety_factor}"
            )));
        }
        self.safety_factor = safety_factor;
        Ok(())
    }

    // --- Geometry pair ---

    /// Edits a dimension box; the spacing of that axis follows.
    pub fn set_dimension(&mut self, axis: Axis, raw: f64) -> u32 {
        let dimension = u32::try_from(clamp_count(raw)).unwrap_or(u32::MAX);
        self.write_axis(axis, dimension, spacing_for(dimension));
        dimension
    }

    /// Edits a spacing box; the dimension of that axis follows, floored.
    ///
    /// The stored spacing is the value typed, not `1 / dimension`.
    pub fn set_spacing(&mut self, axis: Axis, spacing: f64) -> DriverResult<u32> {
        let dimension = dimension_for(spacing).ok_or_else(|| {
            DriverError::UserInput(format!("grid spacing must be positive, got {spacing}"))
        })?;
        self.write_axis(axis, dimension, spacing);
        Ok(dimension)
    }

    fn write_axis(&mut self, axis: Axis, dimension: u32, spacing: f64) {
        match self.mode {
            GeometryMode::Independent => self.geometry.set_axis(axis, dimension, spacing),
            GeometryMode::Square => {
                self.geometry.set_axis(Axis::X, dimension, spacing);
                self.geometry.set_axis(Axis::Y, dimension, spacing);
            }
        }
    }

    /// Replaces the geometry wholesale, as a reset does.
    pub fn replace_geometry(&mut self, geometry: GridGeometry) {
        self.geometry = geometry;
    }

    // --- One-shot derivations ---

    /// Sets the draft step size to the stability-safe value for the current
    /// draft diffusivity and grid dimensions.
    pub fn auto_step_size(&mut self) -> DriverResult<f32> {
        let diffusivity = f64::from(self.draft.diffusivity);
        if !(diffusivity.is_finite() && diffusivity > 0.0) {
            return Err(DriverError::UserInput(format!(
                "cannot derive a step size for diffusivity {diffusivity}"
            )));
        }
        let step_size = stable_step_size(
            self.safety_factor,
            diffusivity,
            self.geometry.width,
            self.geometry.height,
        ) as f32;
        debug!("Auto step size: {:e} (safety factor {})", step_size, self.safety_factor);
        self.draft.step_size = step_size;
        Ok(step_size)
    }

    /// Sets the draft step budget to cover `target_time` with the draft step size.
    pub fn auto_step_budget(&mut self, target_time: f64) -> DriverResult<u64> {
        let step_size = f64::from(self.draft.step_size);
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(DriverError::UserInput(format!(
                "cannot derive a step budget for step size {step_size}"
            )));
        }
        if !(target_time.is_finite() && target_time > 0.0) {
            return Err(DriverError::UserInput(format!(
                "target time must be positive, got {target_time}"
            )));
        }
        self.draft_max_step_count = step_budget_for(target_time, step_size);
        debug!("Auto step budget: {} steps for t = {}", self.draft_max_step_count, target_time);
        Ok(self.draft_max_step_count)
    }

    /// Validates the draft and makes it the applied set. The caller pushes it.
    pub fn apply(&mut self) -> DriverResult<SimulationParameters> {
        self.draft
            .validate()
            .map_err(|e| DriverError::UserInput(e.to_string()))?;
        self.applied = self.draft;
        self.max_step_count = self.draft_max_step_count;
        Ok(self.applied)
    }
}
