//! The two bridge ports and the agent contracts they are bound to.

/// Port facing the agent that services requests.
pub mod downstream;
/// Port facing the agent that issues requests.
pub mod upstream;

pub use downstream::DownstreamPort;
pub use upstream::UpstreamPort;

use crate::{Admission, AddrRange, ClockDomain, Cycles, Tick, TimingHintPolicy, Transaction};

/// Forwarding latency of one direction through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortTiming {
    clock: ClockDomain,
    delay: Cycles,
    hints: TimingHintPolicy,
}

impl PortTiming {
    /// Creates the timing for a direction forwarding after `delay` cycles.
    #[must_use]
    pub const fn new(clock: ClockDomain, delay: Cycles, hints: TimingHintPolicy) -> Self {
        Self {
            clock,
            delay,
            hints,
        }
    }

    /// Forwarding delay in ticks.
    #[must_use]
    pub const fn delay_ticks(self) -> Tick {
        self.clock.cycles_to_ticks(self.delay)
    }

    /// Earliest departure for a transaction arriving at `now`.
    #[must_use]
    pub const fn ready_at(self, now: Tick) -> Tick {
        self.clock.clock_edge(now, self.delay)
    }

    /// Applies the word-delay policy for one crossing.
    pub fn charge<T: Transaction>(self, txn: &mut T) {
        self.hints.apply(txn, self.delay_ticks());
    }
}

/// Admission state of the upstream port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RetryState {
    /// Requests are being accepted.
    #[default]
    Idle,
    /// A request was refused; the upstream agent is owed a retry and must not
    /// submit until it arrives.
    RetryPending,
}

/// Contract of the agent upstream of the bridge.
pub trait Requestor<T> {
    /// Offers a response. Refusing it obliges the agent to call
    /// [`crate::Bridge::recv_resp_retry`] later.
    fn recv_timing_resp(&mut self, pkt: T) -> Admission<T>;

    /// A previously refused request may now be resubmitted.
    ///
    /// The bridge is busy while this runs; resubmit from a later handler.
    fn recv_req_retry(&mut self);

    /// Address ranges served through the bridge, sent at initialization.
    fn recv_range_change(&mut self, ranges: &[AddrRange]) {
        let _ = ranges;
    }
}

/// Contract of the agent downstream of the bridge.
pub trait Responder<T> {
    /// Offers a request. Refusing it obliges the agent to call
    /// [`crate::Bridge::recv_req_retry`] later.
    fn recv_timing_req(&mut self, pkt: T) -> Admission<T>;

    /// Services a request synchronously and reports its latency.
    fn recv_atomic(&mut self, pkt: &mut T) -> Tick;

    /// Services a functional access instantly.
    fn recv_functional(&mut self, pkt: &mut T);
}

#[cfg(test)]
mod tests {
    use super::RetryState;

    #[test]
    fn retry_state_defaults_to_idle() {
        assert_eq!(RetryState::default(), RetryState::Idle);
    }
}
