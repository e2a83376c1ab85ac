//! Two-phase handshake for the diagnostic readback.
//!
//! Reading the aggregate energy back from the backend is slow, so a tick only
//! ever issues the request and later ticks poll for the answer. At most one
//! request is outstanding.

use crate::backend::Backend;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// No request pending; the next tick may issue one.
    #[default]
    AwaitingIssue,
    /// A request is in flight; no new request may be issued.
    AwaitingCompletion,
}

#[derive(Debug, Clone, Default)]
pub struct ReadbackGate {
    state: GateState,
    issued: u64,
    completed: u64,
}

impl ReadbackGate {
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Requests issued since the gate was created.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Requests whose value has been consumed.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Issues a readback if none is pending. Returns whether a request went out.
    pub fn try_issue<B: Backend>(&mut self, backend: &mut B) -> bool {
        if self.state != GateState::AwaitingIssue {
            return false;
        }
        backend.request_diagnostic();
        self.state = GateState::AwaitingCompletion;
        self.issued += 1;
        debug!("Diagnostic readback #{} issued", self.issued);
        true
    }

    /// Collects the pending readback if the backend reports it ready.
    ///
    /// `None` means nothing was ready this time; that is not an error.
    pub fn poll<B: Backend>(&mut self, backend: &mut B) -> Option<f64> {
        if self.state != GateState::AwaitingCompletion || !backend.is_diagnostic_ready() {
            return None;
        }
        let value = backend.fetch_diagnostic();
        self.state = GateState::AwaitingIssue;
        self.completed += 1;
        debug!("Diagnostic readback #{} completed: {}", self.completed, value);
        Some(value)
    }

    /// Forgets any outstanding request.
    pub fn reset(&mut self) {
        self.state = GateState::AwaitingIssue;
    }
}
