//! Construction-time bridge parameters.

use crate::{
    Addr, AddrRange, ClockDomain, ConfigError, Cycles, Direction, Tick, TimingHintPolicy,
    TrafficTag,
};

/// Default number of slots in each queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Immutable configuration for a bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BridgeConfig {
    /// Forwarding delay for requests, upstream to downstream.
    pub request_delay: Cycles,
    /// Forwarding delay for responses, downstream to upstream.
    pub response_delay: Cycles,
    /// Maximum number of requests queued towards the downstream agent.
    pub request_queue_capacity: usize,
    /// Maximum number of response slots reserved towards the upstream agent.
    pub response_queue_capacity: usize,
    /// Address ranges the upstream side advertises as served.
    pub ranges: Vec<AddrRange>,
    /// Tag attached to every request crossing the bridge.
    pub traffic_tag: TrafficTag,
    /// Base address associated with the traffic tag.
    pub tag_base_addr: Addr,
    /// Clock period in ticks.
    pub clock_period: Tick,
    /// Treatment of word-delay hints on crossing.
    pub timing_hints: TimingHintPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_delay: Cycles(1),
            response_delay: Cycles(1),
            request_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            response_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ranges: vec![AddrRange::ALL],
            traffic_tag: TrafficTag::default(),
            tag_base_addr: 0,
            clock_period: 1,
            timing_hints: TimingHintPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Checks capacities, clock period, and ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                direction: Direction::Request,
            });
        }
        if self.response_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                direction: Direction::Response,
            });
        }
        if self.clock_period == 0 {
            return Err(ConfigError::ZeroClockPeriod);
        }
        for range in &self.ranges {
            AddrRange::new(range.start(), range.end())?;
        }
        Ok(())
    }

    /// Clock domain derived from the configured period.
    #[must_use]
    pub const fn clock(&self) -> ClockDomain {
        ClockDomain::new(self.clock_period)
    }
}
