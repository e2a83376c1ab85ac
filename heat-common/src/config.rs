use crate::sim_params::SimulationParameters;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Grid dimensions used for the load-time backend initialization
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
    /// Single spacing for both axes; editing either axis drives the other.
    #[serde(default)]
    pub square: bool,
}

// Step budget and the one-shot derivations applied before a run
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub max_step_count: u64,
    /// Model time the auto step budget aims for.
    #[serde(default)]
    pub target_time: Option<f64>,
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
    #[serde(default)]
    pub auto_step_size: bool,
    #[serde(default)]
    pub auto_step_budget: bool,
    /// Ticks per second; `None` runs ticks back to back.
    #[serde(default)]
    pub frame_rate: Option<f64>,
}

/// Field used to fill a freshly allocated grid.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InitialCondition {
    #[default]
    Zero,
    Gaussian {
        peak: f32,
    },
    Disc {
        radius: f32,
        value: f32,
    },
    Noise {
        seed: u64,
        amplitude: f32,
    },
}

// Settings for the headless CPU backend
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub initial_condition: InitialCondition,
    /// Renders that pass before a requested diagnostic becomes readable.
    #[serde(default = "default_readback_latency_frames")]
    pub readback_latency_frames: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            initial_condition: InitialCondition::default(),
            readback_latency_frames: default_readback_latency_frames(),
        }
    }
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_history: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub export_final_state: bool,
    /// Write the last rendered frame as a heatmap PNG.
    #[serde(default)]
    pub save_heatmap: bool,
    /// CSV state to import instead of starting from the initial condition.
    #[serde(default)]
    pub import_csv: Option<PathBuf>,
}

fn default_safety_factor() -> f64 {
    0.9
}

fn default_readback_latency_frames() -> u32 {
    2
}

// Main driver configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HeatConfig {
    pub grid: GridConfig,
    pub parameters: SimulationParameters,
    pub run: RunConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    pub output: OutputConfig,
}

impl HeatConfig {
    /// Loads the driver configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: HeatConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.grid.width == 0 || self.grid.height == 0 {
            anyhow::bail!("grid width and height must be at least 1.");
        }
        if self.run.max_step_count == 0 {
            anyhow::bail!("max_step_count must be greater than 0.");
        }
        if !(self.run.safety_factor.is_finite() && self.run.safety_factor > 0.0) {
            anyhow::bail!("safety_factor must be positive.");
        }
        if let Some(target_time) = self.run.target_time {
            if !(target_time.is_finite() && target_time > 0.0) {
                anyhow::bail!("target_time must be positive.");
            }
        } else if self.run.auto_step_budget {
            anyhow::bail!("auto_step_budget requires run.target_time.");
        }
        if let Some(frame_rate) = self.run.frame_rate {
            if !(frame_rate.is_finite() && frame_rate > 0.0) {
                anyhow::bail!("frame_rate must be positive.");
            }
        }
        self.parameters.validate()?;
        Ok(())
    }

    /// The parameter set pushed to the backend on initialization.
    pub fn to_parameters(&self) -> SimulationParameters {
        self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [grid]
        width = 64
        height = 32

        [parameters]
        step_batch_size = 50
        diffusivity = 0.5
        step_size = 1e-5
        min_bound = 0.0
        max_bound = 10.0

        [run]
        max_step_count = 1000

        [output]
        base_filename = "run"
        save_history = true
    "#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = HeatConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.grid.width, 64);
        assert!(!config.grid.square);
        assert_eq!(config.run.safety_factor, 0.9);
        assert_eq!(config.backend.initial_condition, InitialCondition::Zero);
        assert!(!config.output.save_heatmap);
        assert_eq!(config.backend.readback_latency_frames, 2);
        assert_eq!(config.to_parameters().step_batch_size, 50);
        assert!(config.output.format.is_none());
    }

    #[test]
    fn initial_condition_is_tagged_by_kind() {
        let text = format!(
            "{MINIMAL}\n[backend]\ninitial_condition = {{ kind = \"disc\", radius = 0.2, value = 100.0 }}\n"
        );
        let config = HeatConfig::from_toml_str(&text).unwrap();
        assert_eq!(
            config.backend.initial_condition,
            InitialCondition::Disc { radius: 0.2, value: 100.0 }
        );
    }

    #[test]
    fn rejects_zero_budget_and_budget_without_target() {
        let zero_budget = MINIMAL.replace("max_step_count = 1000", "max_step_count = 0");
        assert!(HeatConfig::from_toml_str(&zero_budget).is_err());

        let no_target = MINIMAL.replace(
            "max_step_count = 1000",
            "max_step_count = 1000\nauto_step_budget = true",
        );
        assert!(HeatConfig::from_toml_str(&no_target).is_err());
    }

    #[test]
    fn rejects_invalid_parameters() {
        let inverted = MINIMAL.replace("max_bound = 10.0", "max_bound = -1.0");
        assert!(HeatConfig::from_toml_str(&inverted).is_err());
    }
}
