//! Scenario-driven harness that runs a tag bridge between a traffic
//! generator and a memory model.

use tracing_subscriber as _;

/// Traffic generator and memory model agents.
pub mod agents;
/// Discrete-event loop and run report.
pub mod kernel;
/// Scenario file format.
pub mod scenario;

pub use agents::{MemoryModel, TrafficGenerator, GENERATOR_PORT};
pub use kernel::{simulate, SimBridge, SimError, SimEvent, SimReport, Simulation};
pub use scenario::{AccessKind, AccessMode, MemorySpec, Scenario, ScenarioError, TrafficItem};

#[cfg(test)]
use tempfile as _;
