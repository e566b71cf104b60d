//! Tagging request/response bridge for discrete-event memory-system
//! simulation.

/// Virtual time units and clock-edge arithmetic.
pub mod time;
pub use time::{ClockDomain, Cycles, Tick};

/// Address ranges served by the bridge.
pub mod addr;
pub use addr::{Addr, AddrRange};

/// Fatal bridge conditions and configuration errors.
pub mod error;
pub use error::{BridgeError, ConfigError, Side};

/// Transaction interface consumed by the bridge.
pub mod transaction;
pub use transaction::{Admission, PortId, TimingHintPolicy, TrafficTag, Transaction, TransactionId};

/// Reference memory packet.
pub mod packet;
pub use packet::{Command, Packet};

/// Host scheduling capability and deterministic event queue.
pub mod sched;
pub use sched::{Direction, EventQueue, Scheduler};

/// Directional bounded transmit queue.
pub mod queue;
pub use queue::{DeferredItem, TransmitQueue};

/// Per-request routing state side table.
pub mod state;
pub use state::{RequestState, RequestStateTable};

/// Construction-time parameters.
pub mod config;
pub use config::{BridgeConfig, DEFAULT_QUEUE_CAPACITY};

/// Upstream and downstream ports and agent contracts.
pub mod port;
pub use port::{DownstreamPort, PortTiming, Requestor, Responder, RetryState, UpstreamPort};

/// The bridge component.
pub mod bridge;
pub use bridge::Bridge;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
