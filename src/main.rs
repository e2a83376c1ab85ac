use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

// Binary-only backend
mod cpu_backend;

use cpu_backend::CpuHeatBackend;
use heat_common::{DiagnosticSample, HeatConfig, OutputConfig};
use heat_driver::{DiskFileSaver, Driver, ImmediateFrames, PacedFrames, ParameterStore, RecordingSink};

/// Command-line arguments for the headless driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// CSV grid to import instead of the configured initial condition
    #[arg(long)]
    import: Option<PathBuf>,

    /// Export the final state as CSV even if the config does not ask for it
    #[arg(long)]
    export: bool,

    /// Override the step budget of the run
    #[arg(long)]
    max_steps: Option<u64>,

    /// Pace ticks to the configured frame rate (60 per second if unset)
    #[arg(long)]
    realtime: bool,

    /// Directory for the diagnostic history and exported state
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Heat Driver (headless CPU backend)...");

    // --- Load Configuration ---
    let config = HeatConfig::load(&args.config)?;
    debug!("Configuration: {:#?}", config);

    // --- Initialize Backend and Driver ---
    let backend = CpuHeatBackend::new(
        config.backend.initial_condition,
        config.backend.readback_latency_frames,
    );
    let mut driver = Driver::new(
        backend,
        RecordingSink::default(),
        ParameterStore::from_config(&config),
    );
    pollster::block_on(driver.reset_with_dimensions())
        .context("Failed to initialize the backend")?;

    let import = args.import.clone().or_else(|| config.output.import_csv.clone());
    if let Some(path) = import {
        pollster::block_on(driver.import_file(&path))
            .with_context(|| format!("Failed to import {}", path.display()))?;
    }

    // --- One-shot derivations, then push the parameter set ---
    if config.run.auto_step_size {
        let step_size = driver.auto_step_size()?;
        info!("Using stability-limited step size {:e}.", step_size);
    }
    if config.run.auto_step_budget {
        if let Some(target_time) = config.run.target_time {
            let budget = driver.auto_step_budget(target_time)?;
            info!("Step budget {} reaches t = {}.", budget, target_time);
        }
    }
    if let Some(max_steps) = args.max_steps {
        driver.params_mut().set_max_step_count(max_steps as f64);
    }
    driver.apply_parameters()?;
    debug!(
        "Each tick advances model time by {:e}.",
        driver.params().applied().batch_duration()
    );

    // --- Run ---
    driver.start()?;
    let start_time = Instant::now();
    let frame_rate = config.run.frame_rate.or(args.realtime.then_some(60.0));
    let ticks = match frame_rate {
        Some(rate) => {
            let mut frames = PacedFrames::new(rate);
            info!("Pacing ticks every {:?}.", frames.interval());
            driver.run(&mut frames)
        }
        None => driver.run(&mut ImmediateFrames),
    };
    let elapsed = start_time.elapsed();
    info!(
        "Ran {} ticks ({} steps) in {:.3} s; presented {} frames.",
        ticks,
        driver.session().clock().step_count(),
        elapsed.as_secs_f64(),
        driver.backend().frames_presented()
    );
    if let Some(mean) = driver.backend().mean_frame_intensity() {
        debug!("Final frame mean intensity: {:.4}", mean);
    }

    // --- Save Recorded Data ---
    if config.output.save_history {
        save_history(&config.output, &args.out_dir, &driver.sink().diagnostics)?;
    } else {
        info!("Skipping saving diagnostic history as per config (save_history is false).");
    }

    if args.export || config.output.export_final_state {
        let mut saver = DiskFileSaver::new(&args.out_dir);
        let filename = format!("{}_final_state.csv", config.output.base_filename);
        pollster::block_on(driver.export_state(&mut saver, &filename))?;
    } else {
        info!("Skipping final state export as per config.");
    }

    if config.output.save_heatmap {
        let path = args
            .out_dir
            .join(format!("{}_final_state.png", config.output.base_filename));
        match driver.backend().heatmap() {
            Some(image) => {
                image
                    .save(&path)
                    .with_context(|| format!("Error writing heatmap to '{}'", path.display()))?;
                info!("Final frame heatmap saved to {}", path.display());
            }
            None => warn!("No frame was rendered; skipping the heatmap."),
        }
    }

    info!("Driver Complete.");
    Ok(())
}

fn write_json(path: &Path, history: &[DiagnosticSample]) -> Result<()> {
    let json_string = serde_json::to_string(history).context("Error serializing history to JSON")?;
    let mut file = File::create(path)
        .with_context(|| format!("Error creating history file '{}'", path.display()))?;
    file.write_all(json_string.as_bytes())
        .with_context(|| format!("Error writing history JSON to '{}'", path.display()))?;
    Ok(())
}

/// Saves the published diagnostics in the configured format.
fn save_history(output: &OutputConfig, out_dir: &Path, history: &[DiagnosticSample]) -> Result<()> {
    if history.is_empty() {
        warn!("No diagnostics were published; the history file will be empty.");
    }
    let output_format = output.format.as_deref().unwrap_or("json");
    let base = &output.base_filename;

    match output_format {
        "json" => {
            let path = out_dir.join(format!("{}_history.json", base));
            write_json(&path, history)?;
            info!("Diagnostic history saved to {} ({} samples)", path.display(), history.len());
        }
        "bincode" => {
            // Binary format (much more compact)
            let path = out_dir.join(format!("{}_history.bin", base));
            let file = File::create(&path)
                .with_context(|| format!("Error creating history file '{}'", path.display()))?;
            bincode::serialize_into(file, history).context("Error serializing history to bincode")?;
            info!("Diagnostic history saved to {} (binary format)", path.display());
        }
        "messagepack" => {
            let path = out_dir.join(format!("{}_history.msgpack", base));
            let mut file = File::create(&path)
                .with_context(|| format!("Error creating history file '{}'", path.display()))?;
            rmp_serde::encode::write(&mut file, history)
                .context("Error serializing history to MessagePack")?;
            info!("Diagnostic history saved to {} (MessagePack format)", path.display());
        }
        _ => {
            error!("Unknown output format: {}. Using JSON instead.", output_format);
            let path = out_dir.join(format!("{}_history.json", base));
            write_json(&path, history)?;
            info!("Diagnostic history saved to {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(base_filename: &str, format: &str) -> OutputConfig {
        OutputConfig {
            base_filename: base_filename.to_string(),
            save_history: true,
            format: Some(format.to_string()),
            export_final_state: false,
            save_heatmap: false,
            import_csv: None,
        }
    }

    #[test]
    fn export_flag_is_off_unless_given() {
        let args = Args::try_parse_from(["heat-driver", "--config", "run.toml"]).unwrap();
        assert!(!args.export);
        assert_eq!(args.config, PathBuf::from("run.toml"));

        let args = Args::try_parse_from(["heat-driver", "--export", "--max-steps", "300"]).unwrap();
        assert!(args.export);
        assert_eq!(args.max_steps, Some(300));
    }

    #[test]
    fn history_name_keeps_dotted_base_filename() {
        let dir = tempfile::tempdir().unwrap();
        let history = vec![DiagnosticSample { simulated_time: 0.5, value: 12.0 }];

        save_history(&output("run.v2", "json"), dir.path(), &history).unwrap();
        save_history(&output("run.v2", "messagepack"), dir.path(), &history).unwrap();

        let json = std::fs::read_to_string(dir.path().join("run.v2_history.json")).unwrap();
        let restored: Vec<DiagnosticSample> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].value, 12.0);
        assert!(dir.path().join("run.v2_history.msgpack").is_file());
        assert!(!dir.path().join("run.history.json").exists());
    }
}
