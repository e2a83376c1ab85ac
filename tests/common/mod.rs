#![allow(dead_code)]

use anyhow::Result;
use heat_driver::{
    Backend, Driver, GeometryMode, GridGeometry, ParameterStore, RecordingSink,
    SimulationParameters, StopHandle,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Step(u32),
    Render,
    PushParameters(SimulationParameters),
    RequestDiagnostic,
    IsDiagnosticReady,
    FetchDiagnostic,
    DiscardState,
    Reinit(u32, u32),
    ParseBuffer(String),
    CommitParsedBuffer,
    FetchInitialDiagnostic,
    SerializeToText,
}

/// Backend double that records every call and answers from a script.
#[derive(Debug)]
pub struct ScriptedBackend {
    pub calls: Vec<Call>,
    pub width: u32,
    pub height: u32,
    /// Status returned by `parse_buffer`.
    pub parse_status: String,
    /// Geometry the backend reports after a commit.
    pub import_shape: (u32, u32),
    /// Polls after a request until readiness is reported; `None` never completes.
    pub readback_delay: Option<u32>,
    pub diagnostic_value: f64,
    pub initial_diagnostic: f64,
    pub export_text: String,
    /// Raises the stop handle during the n-th `step` call (1-based).
    pub stop_during_step: Option<(usize, StopHandle)>,
    pub fail_reinit: bool,
    pending: bool,
    polls_since_request: u32,
    steps: usize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            width: 8,
            height: 8,
            parse_status: "success!".to_string(),
            import_shape: (8, 8),
            readback_delay: Some(1),
            diagnostic_value: 42.0,
            initial_diagnostic: 7.5,
            export_text: "1,2\n3,4\n".to_string(),
            stop_during_step: None,
            fail_reinit: false,
            pending: false,
            polls_since_request: 0,
            steps: 0,
        }
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls.iter().filter(|c| *c == wanted).count()
    }

    pub fn steps(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Step(_))).count()
    }

    pub fn pushed(&self) -> Vec<SimulationParameters> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::PushParameters(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, wanted: &Call) -> Option<usize> {
        self.calls.iter().position(|c| c == wanted)
    }
}

impl Backend for ScriptedBackend {
    fn step(&mut self, batch_size: u32) {
        self.calls.push(Call::Step(batch_size));
        self.steps += 1;
        if let Some((n, handle)) = &self.stop_during_step {
            if *n == self.steps {
                handle.request_stop();
            }
        }
    }

    fn render(&mut self) {
        self.calls.push(Call::Render);
    }

    fn push_parameters(&mut self, params: &SimulationParameters) {
        self.calls.push(Call::PushParameters(*params));
    }

    fn request_diagnostic(&mut self) {
        self.calls.push(Call::RequestDiagnostic);
        self.pending = true;
        self.polls_since_request = 0;
    }

    fn is_diagnostic_ready(&mut self) -> bool {
        self.calls.push(Call::IsDiagnosticReady);
        if !self.pending {
            return false;
        }
        self.polls_since_request += 1;
        match self.readback_delay {
            Some(delay) if self.polls_since_request >= delay => {
                self.pending = false;
                true
            }
            _ => false,
        }
    }

    fn fetch_diagnostic(&mut self) -> f64 {
        self.calls.push(Call::FetchDiagnostic);
        self.diagnostic_value
    }

    fn discard_state(&mut self) {
        self.calls.push(Call::DiscardState);
        self.pending = false;
    }

    async fn reinit_with_dimensions(&mut self, width: u32, height: u32) -> Result<()> {
        self.calls.push(Call::Reinit(width, height));
        if self.fail_reinit {
            anyhow::bail!("adapter lost");
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn parse_buffer(&mut self, text: &str) -> String {
        self.calls.push(Call::ParseBuffer(text.to_string()));
        self.parse_status.clone()
    }

    async fn commit_parsed_buffer(&mut self) -> Result<()> {
        self.calls.push(Call::CommitParsedBuffer);
        (self.width, self.height) = self.import_shape;
        Ok(())
    }

    fn current_width(&self) -> u32 {
        self.width
    }

    fn current_height(&self) -> u32 {
        self.height
    }

    async fn fetch_initial_diagnostic(&mut self) -> Result<f64> {
        self.calls.push(Call::FetchInitialDiagnostic);
        Ok(self.initial_diagnostic)
    }

    async fn serialize_to_text(&mut self) -> Result<String> {
        self.calls.push(Call::SerializeToText);
        Ok(self.export_text.clone())
    }
}

/// Batch 100, step size 0.5, budget 500, 8x8 grid.
pub fn params() -> ParameterStore {
    ParameterStore::new(
        SimulationParameters {
            step_batch_size: 100,
            diffusivity: 1.0,
            step_size: 0.5,
            min_bound: 0.0,
            max_bound: 100.0,
        },
        500,
        GridGeometry::from_dimensions(8, 8),
        GeometryMode::Independent,
    )
}

pub fn driver(backend: ScriptedBackend) -> Driver<ScriptedBackend, RecordingSink> {
    Driver::new(backend, RecordingSink::default(), params())
}
