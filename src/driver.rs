use crate::backend::Backend;
use crate::codec::{self, FileSaver};
use crate::error::{DriverError, DriverResult};
use crate::params::ParameterStore;
use crate::reset;
use crate::scheduler::{self, FrameClock, TickOutcome};
use crate::session::{Session, StopHandle};
use crate::sink::UiSink;
use log::{error, info};
use std::path::Path;

/// Owns a backend, a UI sink, the parameter store and the session, and turns
/// user actions into correctly ordered backend calls.
pub struct Driver<B: Backend, S: UiSink> {
    backend: B,
    sink: S,
    params: ParameterStore,
    session: Session,
}

impl<B: Backend, S: UiSink> Driver<B, S> {
    pub fn new(backend: B, sink: S, params: ParameterStore) -> Self {
        Self {
            backend,
            sink,
            params,
            session: Session::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    /// Draft edits. Nothing reaches the backend until [`Driver::apply_parameters`].
    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shows user-facing failures in the sink before handing them back.
    fn surface<T>(&mut self, result: DriverResult<T>) -> DriverResult<T> {
        if let Err(e) = &result {
            match e {
                DriverError::Backend(_) | DriverError::Io { .. } => error!("{:#}", e),
                _ => {}
            }
            self.sink.publish_message(&e.to_string());
        }
        result
    }

    /// Validates the draft and pushes the full parameter set to the backend.
    pub fn apply_parameters(&mut self) -> DriverResult<()> {
        let result = self.params.apply().map(|applied| {
            self.backend.push_parameters(&applied);
            info!(
                "Parameters applied: batch {}, kappa {}, dt {:e}, bounds [{}, {}], budget {} steps.",
                applied.step_batch_size,
                applied.diffusivity,
                applied.step_size,
                applied.min_bound,
                applied.max_bound,
                self.params.max_step_count()
            );
        });
        self.surface(result)
    }

    pub fn auto_step_size(&mut self) -> DriverResult<f32> {
        let result = self.params.auto_step_size();
        self.surface(result)
    }

    pub fn auto_step_budget(&mut self, target_time: f64) -> DriverResult<u64> {
        let result = self.params.auto_step_budget(target_time);
        self.surface(result)
    }

    // --- Stepping ---

    pub fn start(&mut self) -> DriverResult<()> {
        let result = self.session.start();
        if result.is_ok() {
            info!(
                "Run started: budget {} steps in batches of {}.",
                self.params.max_step_count(),
                self.params.applied().step_batch_size
            );
        }
        self.surface(result)
    }

    pub fn stop(&mut self) {
        self.session.stop();
        info!("Stop requested.");
    }

    /// Handle for stopping the run from outside the tick loop.
    pub fn stop_handle(&self) -> StopHandle {
        self.session.stop_handle()
    }

    pub fn tick(&mut self) -> TickOutcome {
        scheduler::tick(
            &mut self.session,
            &self.params,
            &mut self.backend,
            &mut self.sink,
        )
    }

    /// Ticks until the run ends. Returns the number of ticks.
    pub fn run<C: FrameClock>(&mut self, clock: &mut C) -> u64 {
        scheduler::run(
            &mut self.session,
            &self.params,
            &mut self.backend,
            &mut self.sink,
            clock,
        )
    }

    // --- Resets ---

    /// Rebuilds the backend with the dimensions currently in the geometry boxes.
    pub async fn reset_with_dimensions(&mut self) -> DriverResult<()> {
        let geometry = *self.params.geometry();
        self.reset_to(geometry.width, geometry.height).await
    }

    pub async fn reset_to(&mut self, width: u32, height: u32) -> DriverResult<()> {
        let result = reset::reset_with_dimensions(
            &mut self.session,
            &mut self.params,
            &mut self.backend,
            &mut self.sink,
            width,
            height,
        )
        .await;
        self.surface(result)
    }

    /// Replaces backend state with a CSV text buffer. Returns its initial diagnostic.
    pub async fn import_buffer(&mut self, text: &str) -> DriverResult<f64> {
        let result = reset::import_buffer(
            &mut self.session,
            &mut self.params,
            &mut self.backend,
            &mut self.sink,
            text,
        )
        .await;
        self.surface(result)
    }

    pub async fn import_file(&mut self, path: &Path) -> DriverResult<f64> {
        let text = codec::read_import_file(path);
        let text = self.surface(text)?;
        info!("Importing {}", path.display());
        self.import_buffer(&text).await
    }

    /// Serializes the backend state and hands it to `saver` as `filename`.
    pub async fn export_state<F: FileSaver>(
        &mut self,
        saver: &mut F,
        filename: &str,
    ) -> DriverResult<usize> {
        let result = codec::export(&mut self.backend, saver, filename).await;
        self.surface(result)
    }
}
