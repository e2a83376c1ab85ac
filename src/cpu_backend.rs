use anyhow::Result;
use heat_common::{InitialCondition, SimulationParameters};
use heat_driver::{Backend, SUCCESS_PREFIX};
use image::{Rgba, RgbaImage};
use log::{debug, trace, warn};
use palette::{FromColor, Hsv, Srgb};
use rand::prelude::*;
use rayon::prelude::*;

/// Heatmap colour of a normalised intensity: blue when cold, red when hot.
fn heat_colour(intensity: f32) -> Rgba<u8> {
    let hue = 240.0 * (1.0 - intensity.clamp(0.0, 1.0));
    let hsv: Hsv = Hsv::new(hue, 1.0, 1.0);
    let rgb = Srgb::from_color(hsv);
    Rgba([channel(rgb.red), channel(rgb.green), channel(rgb.blue), 255])
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Grid state held in CPU memory.
#[derive(Debug)]
struct HeatGrid {
    width: u32,
    height: u32,
    /// Current temperatures, row-major.
    cells: Vec<f32>,
    // --- Scratch buffers for the midpoint step ---
    rate: Vec<f32>,
    midpoint: Vec<f32>,
    next: Vec<f32>,
}

impl HeatGrid {
    fn from_cells(width: u32, height: u32, cells: Vec<f32>) -> Self {
        let len = cells.len();
        Self {
            width,
            height,
            cells,
            rate: vec![0.0; len],
            midpoint: vec![0.0; len],
            next: vec![0.0; len],
        }
    }

    fn total(&self) -> f64 {
        sum_cells(&self.cells)
    }

    /// One midpoint (RK2) step of u_t = kappa * (u_xx + u_yy) on the unit square.
    fn midpoint_step(&mut self, kappa: f32, dt: f32) {
        let (w, h) = (self.width as usize, self.height as usize);

        laplacian(&self.cells, &mut self.rate, w, h, kappa);
        self.midpoint
            .par_iter_mut()
            .zip(self.cells.par_iter().zip(self.rate.par_iter()))
            .for_each(|(mid, (&u, &k1))| *mid = u + 0.5 * dt * k1);

        laplacian(&self.midpoint, &mut self.rate, w, h, kappa);
        self.next
            .par_iter_mut()
            .zip(self.cells.par_iter().zip(self.rate.par_iter()))
            .for_each(|(out, (&u, &k2))| *out = u + dt * k2);

        // Swap Buffers: Output becomes Input for next step
        std::mem::swap(&mut self.cells, &mut self.next);
    }
}

/// kappa * discrete Laplacian with insulated edges (mirrored ghost cells).
fn laplacian(src: &[f32], dst: &mut [f32], w: usize, h: usize, kappa: f32) {
    let inv_dx2 = (w * w) as f32;
    let inv_dy2 = (h * h) as f32;
    dst.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(h - 1);
        for (x, out) in row.iter_mut().enumerate() {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(w - 1);
            let u = src[y * w + x];
            let u_xx = (src[y * w + left] - 2.0 * u + src[y * w + right]) * inv_dx2;
            let u_yy = (src[up * w + x] - 2.0 * u + src[down * w + x]) * inv_dy2;
            *out = kappa * (u_xx + u_yy);
        }
    });
}

fn sum_cells(cells: &[f32]) -> f64 {
    cells.par_iter().map(|&v| f64::from(v)).sum()
}

/// Fills a `width` x `height` grid from an initial condition, sampled at cell centres.
fn initial_cells(condition: InitialCondition, width: u32, height: u32) -> Vec<f32> {
    let (w, h) = (width as usize, height as usize);
    let centre_r2 = |i: usize| {
        let x = (i % w) as f32 + 0.5;
        let y = (i / w) as f32 + 0.5;
        let dx = x / w as f32 - 0.5;
        let dy = y / h as f32 - 0.5;
        dx * dx + dy * dy
    };
    match condition {
        InitialCondition::Zero => vec![0.0; w * h],
        InitialCondition::Gaussian { peak } => (0..w * h)
            .map(|i| peak * (-10.0 * centre_r2(i)).exp())
            .collect(),
        InitialCondition::Disc { radius, value } => {
            let radius_sq = radius * radius;
            (0..w * h)
                .map(|i| if centre_r2(i) < radius_sq { value } else { 0.0 })
                .collect()
        }
        InitialCondition::Noise { seed, amplitude } => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..w * h).map(|_| amplitude * rng.random::<f32>()).collect()
        }
    }
}

/// Parses comma separated rows of f32 into (cells, width, height), or the
/// user-facing reason it could not.
fn parse_csv_grid(text: &str) -> std::result::Result<(Vec<f32>, u32, u32), String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut cells: Vec<f32> = Vec::new();
    let mut width: usize = 0;
    let mut height: usize = 0;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(_) if height == 0 => return Err("failed to read first line of csv".to_string()),
            Err(_) => {
                return Err(format!(
                    "failed to read line {} of csv, was it longer or shorter than other lines?",
                    height + 1
                ))
            }
        };
        for (x, field) in record.iter().enumerate() {
            match field.parse::<f32>() {
                Ok(value) => cells.push(value),
                Err(_) => {
                    return Err(format!(
                        "could not read csv entry ({},{}) as float32",
                        x, height
                    ))
                }
            }
        }
        if height == 0 {
            width = record.len();
        } else if record.len() != width {
            return Err(format!(
                "line {} of csv was {} long instead of {}",
                height + 1,
                record.len(),
                width
            ));
        }
        height += 1;
    }

    if height == 0 || width == 0 {
        return Err("couldn't find first row".to_string());
    }
    if cells.len() != width * height {
        return Err(format!(
            "csv failed the data-length is width times height test (width {} and height {})",
            width, height
        ));
    }
    let width = u32::try_from(width).map_err(|_| "csv is too wide".to_string())?;
    let height = u32::try_from(height).map_err(|_| "csv is too tall".to_string())?;
    Ok((cells, width, height))
}

/// Diagnostic readback in flight.
#[derive(Debug)]
struct PendingReadback {
    snapshot: Vec<f32>,
    frames_left: u32,
    reported: bool,
}

/// Headless stand-in for the GPU solver: same contract, plain CPU memory.
///
/// Readbacks become ready only after a number of renders, the way a mapped
/// GPU buffer does.
#[derive(Debug)]
pub struct CpuHeatBackend {
    initial_condition: InitialCondition,
    readback_latency_frames: u32,
    params: SimulationParameters,
    grid: Option<HeatGrid>,
    staged: Option<(Vec<f32>, u32, u32)>,
    readback: Option<PendingReadback>,
    /// Last rendered frame: cells mapped onto [0, 1] by the colour bounds.
    frame: Vec<f32>,
    frames_presented: u64,
}

impl CpuHeatBackend {
    pub fn new(initial_condition: InitialCondition, readback_latency_frames: u32) -> Self {
        Self {
            initial_condition,
            readback_latency_frames,
            params: SimulationParameters::default(),
            grid: None,
            staged: None,
            readback: None,
            frame: Vec::new(),
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Average of the last rendered frame, `None` before the first render.
    pub fn mean_frame_intensity(&self) -> Option<f64> {
        if self.frame.is_empty() {
            return None;
        }
        Some(sum_cells(&self.frame) / self.frame.len() as f64)
    }

    /// Last rendered frame as an RGBA heatmap, `None` until a frame of the
    /// current grid has been rendered.
    pub fn heatmap(&self) -> Option<RgbaImage> {
        let grid = self.grid.as_ref()?;
        if self.frame.len() != grid.cells.len() {
            return None;
        }
        let width = grid.width;
        Some(RgbaImage::from_fn(grid.width, grid.height, |x, y| {
            heat_colour(self.frame[(y * width + x) as usize])
        }))
    }

    #[cfg(test)]
    fn cells(&self) -> Option<&[f32]> {
        self.grid.as_ref().map(|g| g.cells.as_slice())
    }
}

impl Backend for CpuHeatBackend {
    fn step(&mut self, batch_size: u32) {
        let Some(grid) = self.grid.as_mut() else {
            warn!("step called without grid state; ignoring.");
            return;
        };
        for _ in 0..batch_size {
            grid.midpoint_step(self.params.diffusivity, self.params.step_size);
        }
    }

    fn render(&mut self) {
        let Some(grid) = self.grid.as_ref() else {
            return;
        };
        let min = self.params.min_bound;
        let span = (self.params.max_bound - min).max(f32::EPSILON);
        self.frame.resize(grid.cells.len(), 0.0);
        self.frame
            .par_iter_mut()
            .zip(grid.cells.par_iter())
            .for_each(|(px, &u)| *px = ((u - min) / span).clamp(0.0, 1.0));
        self.frames_presented += 1;
        if let Some(pending) = self.readback.as_mut() {
            pending.frames_left = pending.frames_left.saturating_sub(1);
        }
        trace!("Presented frame {}", self.frames_presented);
    }

    fn push_parameters(&mut self, params: &SimulationParameters) {
        self.params = *params;
    }

    fn request_diagnostic(&mut self) {
        let Some(grid) = self.grid.as_ref() else {
            warn!("diagnostic requested without grid state.");
            return;
        };
        self.readback = Some(PendingReadback {
            snapshot: grid.cells.clone(),
            frames_left: self.readback_latency_frames,
            reported: false,
        });
    }

    fn is_diagnostic_ready(&mut self) -> bool {
        match self.readback.as_mut() {
            Some(pending) if pending.frames_left == 0 && !pending.reported => {
                pending.reported = true;
                true
            }
            _ => false,
        }
    }

    fn fetch_diagnostic(&mut self) -> f64 {
        match self.readback.take() {
            Some(pending) if pending.reported => sum_cells(&pending.snapshot),
            other => {
                warn!("fetch_diagnostic called before the readback was ready.");
                self.readback = other;
                0.0
            }
        }
    }

    fn discard_state(&mut self) {
        self.grid = None;
        self.readback = None;
        self.frame.clear();
    }

    async fn reinit_with_dimensions(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            anyhow::bail!("cannot allocate a {}x{} grid", width, height);
        }
        let cells = initial_cells(self.initial_condition, width, height);
        self.grid = Some(HeatGrid::from_cells(width, height, cells));
        self.readback = None;
        debug!("Allocated {}x{} grid ({:?}).", width, height, self.initial_condition);
        self.render();
        Ok(())
    }

    fn parse_buffer(&mut self, text: &str) -> String {
        match parse_csv_grid(text) {
            Ok((cells, width, height)) => {
                self.staged = Some((cells, width, height));
                format!("{}! {}x{}", SUCCESS_PREFIX, width, height)
            }
            Err(message) => message,
        }
    }

    async fn commit_parsed_buffer(&mut self) -> Result<()> {
        let Some((cells, width, height)) = self.staged.take() else {
            anyhow::bail!("tried to load from csv buffer but it was empty");
        };
        self.grid = Some(HeatGrid::from_cells(width, height, cells));
        self.readback = None;
        self.render();
        Ok(())
    }

    fn current_width(&self) -> u32 {
        self.grid.as_ref().map_or(0, |g| g.width)
    }

    fn current_height(&self) -> u32 {
        self.grid.as_ref().map_or(0, |g| g.height)
    }

    async fn fetch_initial_diagnostic(&mut self) -> Result<f64> {
        match self.grid.as_ref() {
            Some(grid) => Ok(grid.total()),
            None => anyhow::bail!("no grid state to read back"),
        }
    }

    async fn serialize_to_text(&mut self) -> Result<String> {
        let Some(grid) = self.grid.as_ref() else {
            anyhow::bail!("no grid state to export");
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .has_headers(false)
            .from_writer(vec![]);
        for (row_idx, row) in grid.cells.chunks(grid.width as usize).enumerate() {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| anyhow::anyhow!("writer failed on line {}: {}", row_idx, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("could not flush csv writer: {}", e))?;
        Ok(String::from_utf8(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn backend(condition: InitialCondition, latency: u32) -> CpuHeatBackend {
        let mut backend = CpuHeatBackend::new(condition, latency);
        pollster::block_on(backend.reinit_with_dimensions(16, 12)).unwrap();
        backend.push_parameters(&SimulationParameters {
            step_batch_size: 10,
            diffusivity: 1.0,
            step_size: 1.0e-4,
            min_bound: 0.0,
            max_bound: 100.0,
        });
        backend
    }

    #[test]
    fn insulated_edges_conserve_energy() {
        let mut backend = backend(InitialCondition::Gaussian { peak: 100.0 }, 0);
        let before = pollster::block_on(backend.fetch_initial_diagnostic()).unwrap();
        backend.step(50);
        let after = pollster::block_on(backend.fetch_initial_diagnostic()).unwrap();
        assert_relative_eq!(before, after, max_relative = 1e-4);
    }

    #[test]
    fn diffusion_flattens_a_peak() {
        let mut backend = backend(InitialCondition::Disc { radius: 0.2, value: 50.0 }, 0);
        let peak_before = backend.cells().unwrap().iter().cloned().fold(f32::MIN, f32::max);
        backend.step(20);
        let peak_after = backend.cells().unwrap().iter().cloned().fold(f32::MIN, f32::max);
        assert!(peak_after < peak_before);
    }

    #[test]
    fn noise_is_reproducible_from_its_seed() {
        let condition = InitialCondition::Noise { seed: 7, amplitude: 2.0 };
        assert_eq!(initial_cells(condition, 8, 8), initial_cells(condition, 8, 8));
        assert!(initial_cells(condition, 8, 8).iter().all(|&v| (0.0..2.0).contains(&v)));
    }

    #[test]
    fn readback_waits_for_renders_and_reports_once() {
        let mut backend = backend(InitialCondition::Gaussian { peak: 10.0 }, 2);
        backend.request_diagnostic();
        assert!(!backend.is_diagnostic_ready());
        backend.render();
        assert!(!backend.is_diagnostic_ready());
        backend.render();
        assert!(backend.is_diagnostic_ready());
        assert!(!backend.is_diagnostic_ready());
        let expected = pollster::block_on(backend.fetch_initial_diagnostic()).unwrap();
        assert_relative_eq!(backend.fetch_diagnostic(), expected);
    }

    #[test]
    fn render_maps_cells_onto_colour_bounds() {
        let mut backend = CpuHeatBackend::new(InitialCondition::Zero, 0);
        assert!(backend.mean_frame_intensity().is_none());
        assert!(backend.parse_buffer("-10,50\n100,200\n").starts_with(SUCCESS_PREFIX));
        pollster::block_on(backend.commit_parsed_buffer()).unwrap();
        backend.push_parameters(&SimulationParameters {
            min_bound: 0.0,
            max_bound: 100.0,
            ..SimulationParameters::default()
        });
        backend.render();
        // Clamped to [0, 1]: 0, 0.5, 1, 1
        assert_relative_eq!(backend.mean_frame_intensity().unwrap(), 0.625);
    }

    #[test]
    fn heatmap_runs_blue_to_red_across_bounds() {
        let mut backend = CpuHeatBackend::new(InitialCondition::Zero, 0);
        backend.parse_buffer("-10,50\n100,200\n");
        pollster::block_on(backend.commit_parsed_buffer()).unwrap();
        backend.push_parameters(&SimulationParameters {
            min_bound: 0.0,
            max_bound: 100.0,
            ..SimulationParameters::default()
        });
        backend.render();

        let image = backend.heatmap().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(*image.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(*image.get_pixel(1, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*image.get_pixel(0, 1), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(1, 1), Rgba([255, 0, 0, 255]));

        backend.discard_state();
        assert!(backend.heatmap().is_none());
    }

    #[test]
    fn csv_status_reports_shape_or_reason() {
        let mut backend = CpuHeatBackend::new(InitialCondition::Zero, 0);
        assert_eq!(backend.parse_buffer("1,2,3\n4,5,6\n"), "success! 3x2");
        assert_eq!(
            backend.parse_buffer("1,2\n3,x\n"),
            "could not read csv entry (1,1) as float32"
        );
        assert!(!backend.parse_buffer("1,2\n3\n").starts_with(SUCCESS_PREFIX));
        assert_eq!(backend.parse_buffer(""), "couldn't find first row");
    }

    #[test]
    fn committed_csv_exports_back_unchanged() {
        let mut backend = CpuHeatBackend::new(InitialCondition::Zero, 0);
        let text = "0.5,1,2\n3,4,5.25\n";
        assert!(backend.parse_buffer(text).starts_with(SUCCESS_PREFIX));
        pollster::block_on(backend.commit_parsed_buffer()).unwrap();
        assert_eq!(backend.current_width(), 3);
        assert_eq!(backend.current_height(), 2);
        assert_eq!(pollster::block_on(backend.serialize_to_text()).unwrap(), text);
    }

    #[test]
    fn commit_without_staged_buffer_fails() {
        let mut backend = CpuHeatBackend::new(InitialCondition::Zero, 0);
        assert!(pollster::block_on(backend.commit_parsed_buffer()).is_err());
    }

    #[test]
    fn discarded_state_reports_no_geometry() {
        let mut backend = backend(InitialCondition::Zero, 0);
        backend.discard_state();
        assert_eq!(backend.current_width(), 0);
        assert!(pollster::block_on(backend.serialize_to_text()).is_err());
    }
}
