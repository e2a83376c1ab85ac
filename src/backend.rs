//! The capability contract the driver needs from a compute backend.

use crate::params::SimulationParameters;
use anyhow::Result;

/// An opaque solver/renderer reached through a mix of fire-and-forget and
/// asynchronous calls.
///
/// The driver is the only caller. It guarantees that `discard_state`,
/// `reinit_with_dimensions` and `commit_parsed_buffer` never overlap a tick,
/// so implementations need no locking around their state buffer.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Advances the grid by `batch_size` sub-steps.
    fn step(&mut self, batch_size: u32);

    /// Presents the current grid.
    fn render(&mut self);

    /// Atomically replaces the active parameter set.
    fn push_parameters(&mut self, params: &SimulationParameters);

    /// Issues a non-blocking diagnostic readback.
    fn request_diagnostic(&mut self);

    /// Non-blocking readiness check. Reports true at most once per request.
    fn is_diagnostic_ready(&mut self) -> bool;

    /// Aggregate value of the last completed readback. Only valid right after
    /// `is_diagnostic_ready` returned true.
    fn fetch_diagnostic(&mut self) -> f64;

    /// Frees the current grid state.
    fn discard_state(&mut self);

    /// Allocates a fresh grid of the given size.
    async fn reinit_with_dimensions(&mut self, width: u32, height: u32) -> Result<()>;

    /// Parses and stages a text buffer. The returned status starts with
    /// [`crate::codec::SUCCESS_PREFIX`] when a buffer was staged; anything else
    /// is user-facing error text.
    fn parse_buffer(&mut self, text: &str) -> String;

    /// Commits the buffer staged by the last successful `parse_buffer`.
    async fn commit_parsed_buffer(&mut self) -> Result<()>;

    fn current_width(&self) -> u32;

    fn current_height(&self) -> u32;

    /// One-shot diagnostic of the current grid, used before any stepping.
    async fn fetch_initial_diagnostic(&mut self) -> Result<f64>;

    /// Full grid state as text in the codec's format.
    async fn serialize_to_text(&mut self) -> Result<String>;
}
