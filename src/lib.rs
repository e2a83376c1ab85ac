//! Client-side driver for an interactive 2D heat-equation simulator whose
//! solver runs on an opaque compute backend.
//!
//! The driver sequences user actions (run, stop, apply parameters, reset,
//! import, export) into backend calls without ever blocking a frame on the
//! backend, and keeps grid spacing, the model clock and the energy
//! diagnostic consistent.

pub mod backend;
pub mod clock;
pub mod codec;
pub mod driver;
pub mod error;
pub mod params;
pub mod readback;
pub mod reset;
pub mod scheduler;
pub mod session;
pub mod sink;

// Re-export key types for easier use by dependent crates
pub use backend::Backend;
pub use clock::SimulationClock;
pub use codec::{DiskFileSaver, FileSaver, StagedBuffer, SUCCESS_PREFIX};
pub use driver::Driver;
pub use error::{DriverError, DriverResult};
pub use params::{Axis, GeometryMode, GridGeometry, ParameterStore, SimulationParameters};
pub use readback::{GateState, ReadbackGate};
pub use scheduler::{FrameClock, ImmediateFrames, PacedFrames, TickOutcome};
pub use session::{RunState, Session, StopHandle};
pub use sink::{LogSink, RecordingSink, UiSink};
