//! Tearing down and rebuilding backend state.
//!
//! Both entry points end in the same place: geometry replaced, parameters
//! pushed, clock zeroed, gate ready to issue, session Idle. Both force the
//! session to Stopping before touching the backend; the exclusive borrows
//! they take mean no tick can run while the backend buffer is being swapped.

use crate::backend::Backend;
use crate::codec;
use crate::error::{DriverError, DriverResult};
use crate::params::{GridGeometry, ParameterStore};
use crate::session::Session;
use crate::sink::UiSink;
use log::{info, warn};

fn check_draft(params: &ParameterStore) -> DriverResult<()> {
    params
        .draft()
        .validate()
        .map_err(|e| DriverError::UserInput(e.to_string()))
}

/// Settles driver state after the backend holds a fresh grid of `geometry`.
fn resynchronize<B: Backend, S: UiSink>(
    session: &mut Session,
    params: &mut ParameterStore,
    backend: &mut B,
    sink: &mut S,
    geometry: GridGeometry,
) -> DriverResult<()> {
    let applied = params.apply()?;
    backend.push_parameters(&applied);
    params.replace_geometry(geometry);
    session.reset();
    sink.publish_geometry(geometry.width, geometry.height);
    Ok(())
}

/// Rebuilds the backend with an empty grid of `width` x `height`.
pub async fn reset_with_dimensions<B: Backend, S: UiSink>(
    session: &mut Session,
    params: &mut ParameterStore,
    backend: &mut B,
    sink: &mut S,
    width: u32,
    height: u32,
) -> DriverResult<()> {
    if width == 0 || height == 0 {
        return Err(DriverError::UserInput(format!(
            "grid dimensions must be at least 1, got {}x{}",
            width, height
        )));
    }
    // Refuse a bad draft before anything is torn down
    check_draft(params)?;

    session.force_stopping();
    backend.discard_state();
    if let Err(e) = backend.reinit_with_dimensions(width, height).await {
        session.reset();
        return Err(e.into());
    }

    resynchronize(
        session,
        params,
        backend,
        sink,
        GridGeometry::from_dimensions(width, height),
    )?;
    info!("Session reset to a {}x{} grid.", width, height);
    Ok(())
}

/// Replaces backend state with an imported text buffer.
///
/// Geometry comes from the buffer, so it is read back from the backend after
/// the commit. Returns the initial diagnostic of the imported grid.
pub async fn import_buffer<B: Backend, S: UiSink>(
    session: &mut Session,
    params: &mut ParameterStore,
    backend: &mut B,
    sink: &mut S,
    text: &str,
) -> DriverResult<f64> {
    check_draft(params)?;
    let staged = match codec::parse(backend, text) {
        Ok(staged) => staged,
        Err(e) => {
            warn!("Import rejected: {}", e);
            return Err(e);
        }
    };

    session.force_stopping();
    backend.discard_state();
    if let Err(e) = codec::commit(backend, staged).await {
        session.reset();
        return Err(e);
    }

    let geometry = GridGeometry::from_dimensions(backend.current_width(), backend.current_height());
    resynchronize(session, params, backend, sink, geometry)?;

    let initial = backend.fetch_initial_diagnostic().await?;
    sink.publish_diagnostic(initial, session.clock().simulated_time());
    info!(
        "Imported a {} grid, initial total energy {}.",
        geometry.shape_label(),
        initial
    );
    Ok(initial)
}
