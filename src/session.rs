//! Per-session mutable state: run state, clock and readback gate.

use crate::clock::SimulationClock;
use crate::error::{DriverError, DriverResult};
use crate::readback::ReadbackGate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Stop requested; the loop ends at the next tick boundary.
    Stopping,
}

/// Advisory stop request that can be raised from anywhere, including from
/// inside a backend call while a tick is in flight.
///
/// It is sampled once per tick boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct Session {
    run_state: RunState,
    clock: SimulationClock,
    gate: ReadbackGate,
    stop: StopHandle,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn gate(&self) -> &ReadbackGate {
        &self.gate
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Idle -> Running. Zeroes the step count, keeps model time.
    pub fn start(&mut self) -> DriverResult<()> {
        if self.run_state != RunState::Idle {
            return Err(DriverError::NotIdle(self.run_state));
        }
        self.stop.clear();
        self.clock.restart_step_count();
        self.run_state = RunState::Running;
        Ok(())
    }

    /// Running -> Stopping. Takes effect at the next tick boundary.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Running {
            self.run_state = RunState::Stopping;
        }
    }

    // --- Used by the scheduler and the reset protocol ---

    pub(crate) fn clock_mut(&mut self) -> &mut SimulationClock {
        &mut self.clock
    }

    pub(crate) fn gate_mut(&mut self) -> &mut ReadbackGate {
        &mut self.gate
    }

    /// Folds an out-of-band stop request into the run state.
    pub(crate) fn observe_stop_request(&mut self) {
        if self.stop.take() {
            self.stop();
        }
    }

    pub(crate) fn force_stopping(&mut self) {
        self.run_state = RunState::Stopping;
    }

    pub(crate) fn finish(&mut self) {
        self.run_state = RunState::Idle;
    }

    /// Zero clock, fresh gate, Idle.
    pub(crate) fn reset(&mut self) {
        self.clock = SimulationClock::default();
        self.gate.reset();
        self.stop.clear();
        self.run_state = RunState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_only_from_idle() {
        let mut session = Session::new();
        session.start().unwrap();
        assert_eq!(session.run_state(), RunState::Running);
        assert!(matches!(
            session.start(),
            Err(DriverError::NotIdle(RunState::Running))
        ));
    }

    #[test]
    fn start_zeroes_steps_but_not_time() {
        let mut session = Session::new();
        session.clock_mut().advance(10, 0.5);
        session.start().unwrap();
        assert_eq!(session.clock().step_count(), 0);
        assert_eq!(session.clock().simulated_time(), 5.0);
    }

    #[test]
    fn stop_is_ignored_while_idle() {
        let mut session = Session::new();
        session.stop();
        assert_eq!(session.run_state(), RunState::Idle);
    }

    #[test]
    fn stop_handle_is_sampled_once() {
        let mut session = Session::new();
        session.start().unwrap();
        let handle = session.stop_handle();
        handle.request_stop();
        assert_eq!(session.run_state(), RunState::Running);
        session.observe_stop_request();
        assert_eq!(session.run_state(), RunState::Stopping);
        // Consumed: a fresh run is not cancelled by it
        session.finish();
        session.start().unwrap();
        session.observe_stop_request();
        assert_eq!(session.run_state(), RunState::Running);
    }

    #[test]
    fn stale_stop_request_does_not_cancel_the_next_run() {
        let mut session = Session::new();
        session.stop_handle().request_stop();
        session.start().unwrap();
        session.observe_stop_request();
        assert_eq!(session.run_state(), RunState::Running);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut session = Session::new();
        session.start().unwrap();
        session.clock_mut().advance(3, 1.0);
        session.force_stopping();
        session.reset();
        assert_eq!(session.run_state(), RunState::Idle);
        assert_eq!(*session.clock(), SimulationClock::default());
    }
}
