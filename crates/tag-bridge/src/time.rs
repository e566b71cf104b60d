//! Virtual time units and clock-edge arithmetic.

/// Simulator virtual time unit.
pub type Tick = u64;

/// A duration expressed in clock cycles of the bridge's clock domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Cycles(pub u64);

impl Cycles {
    /// Returns the raw cycle count.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Clock domain the bridge is timed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockDomain {
    period: Tick,
}

impl ClockDomain {
    /// Creates a clock domain with the given period.
    ///
    /// A zero period is clamped to one tick.
    #[must_use]
    pub const fn new(period: Tick) -> Self {
        Self {
            period: if period == 0 { 1 } else { period },
        }
    }

    /// Returns the clock period in ticks.
    #[must_use]
    pub const fn period(self) -> Tick {
        self.period
    }

    /// Converts a cycle count into ticks.
    #[must_use]
    pub const fn cycles_to_ticks(self, cycles: Cycles) -> Tick {
        cycles.0.saturating_mul(self.period)
    }

    /// Returns the first clock edge at or after `now`, offset by `cycles`.
    #[must_use]
    pub const fn clock_edge(self, now: Tick, cycles: Cycles) -> Tick {
        let edge = now.div_ceil(self.period).saturating_mul(self.period);
        edge.saturating_add(self.cycles_to_ticks(cycles))
    }
}

impl Default for ClockDomain {
    fn default() -> Self {
        Self::new(1)
    }
}
