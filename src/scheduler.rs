//! The cooperative stepping loop.
//!
//! One tick is a bounded unit of work bound to one frame opportunity:
//! step, (issue readback,) render, advance the clock, poll the readback,
//! then decide whether another tick is scheduled. Nothing in a tick waits on
//! the backend.

use crate::backend::Backend;
use crate::params::ParameterStore;
use crate::session::{RunState, Session};
use crate::sink::UiSink;
use log::{info, trace};
use std::time::{Duration, Instant};

/// Primitive that hands out the next frame opportunity.
pub trait FrameClock {
    /// Returns when the next tick may run.
    fn wait_for_frame(&mut self);
}

/// Runs ticks back to back.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateFrames;

impl FrameClock for ImmediateFrames {
    fn wait_for_frame(&mut self) {}
}

/// Spaces ticks to a fixed frame rate, like a display refresh.
#[derive(Debug, Clone)]
pub struct PacedFrames {
    interval: Duration,
    last_frame: Option<Instant>,
}

impl PacedFrames {
    pub fn new(frames_per_second: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / frames_per_second.max(1e-3)),
            last_frame: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl FrameClock for PacedFrames {
    fn wait_for_frame(&mut self) {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick is scheduled.
    Continue,
    /// This was the last tick; the session is Idle again.
    Finished,
    /// No run was active, nothing was done.
    Idle,
}

/// Runs one tick of the stepping loop.
///
/// A tick entered while Stopping still runs to completion: it was scheduled
/// before the stop was seen.
pub fn tick<B: Backend, S: UiSink>(
    session: &mut Session,
    params: &ParameterStore,
    backend: &mut B,
    sink: &mut S,
) -> TickOutcome {
    if session.run_state() == RunState::Idle {
        return TickOutcome::Idle;
    }
    let applied = params.applied();

    backend.step(applied.step_batch_size);

    // A readback is only issued on a tick that is about to render
    session.gate_mut().try_issue(backend);
    backend.render();

    session
        .clock_mut()
        .advance(applied.step_batch_size, applied.step_size);

    if let Some(value) = session.gate_mut().poll(backend) {
        sink.publish_diagnostic(value, session.clock().simulated_time());
    }

    trace!(
        "Tick done: step {}/{} (t = {:.6})",
        session.clock().step_count(),
        params.max_step_count(),
        session.clock().simulated_time()
    );

    // --- Tick boundary ---
    session.observe_stop_request();
    if session.clock().step_count() < params.max_step_count()
        && session.run_state() != RunState::Stopping
    {
        TickOutcome::Continue
    } else {
        session.finish();
        TickOutcome::Finished
    }
}

/// Drives ticks until the session goes Idle. Returns the number of ticks run.
pub fn run<B: Backend, S: UiSink, C: FrameClock>(
    session: &mut Session,
    params: &ParameterStore,
    backend: &mut B,
    sink: &mut S,
    clock: &mut C,
) -> u64 {
    let start_time = Instant::now();
    let mut ticks = 0u64;
    loop {
        match tick(session, params, backend, sink) {
            TickOutcome::Continue => {
                ticks += 1;
                clock.wait_for_frame();
            }
            TickOutcome::Finished => {
                ticks += 1;
                break;
            }
            TickOutcome::Idle => break,
        }
    }
    if ticks > 0 {
        info!(
            "Run ended after {} ticks: {} steps, t = {:.6}, {:.3} s wall time.",
            ticks,
            session.clock().step_count(),
            session.clock().simulated_time(),
            start_time.elapsed().as_secs_f64()
        );
    }
    ticks
}
