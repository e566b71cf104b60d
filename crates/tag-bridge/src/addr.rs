//! Address ranges served by the bridge and covered by transactions.

use crate::ConfigError;

/// Physical address.
pub type Addr = u64;

/// Inclusive address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddrRange {
    start: Addr,
    end: Addr,
}

impl AddrRange {
    /// The whole address space.
    pub const ALL: Self = Self {
        start: 0,
        end: Addr::MAX,
    };

    /// Creates a range covering `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvertedRange`] when `start > end`.
    pub const fn new(start: Addr, end: Addr) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates the range touched by a `size`-byte access at `addr`.
    ///
    /// Zero-sized accesses are treated as touching a single byte.
    #[must_use]
    pub const fn from_span(addr: Addr, size: u64) -> Self {
        let last = if size == 0 { 0 } else { size - 1 };
        Self {
            start: addr,
            end: addr.saturating_add(last),
        }
    }

    /// Inclusive start address.
    #[must_use]
    pub const fn start(self) -> Addr {
        self.start
    }

    /// Inclusive end address.
    #[must_use]
    pub const fn end(self) -> Addr {
        self.end
    }

    /// Number of bytes covered, saturating for the full address space.
    #[must_use]
    pub const fn size(self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Returns `true` when `addr` lies inside the range.
    #[must_use]
    pub const fn contains(self, addr: Addr) -> bool {
        addr >= self.start && addr <= self.end
    }

    /// Returns `true` when `other` lies entirely inside this range.
    #[must_use]
    pub const fn covers(self, other: Self) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Returns `true` when the two ranges share at least one address.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for AddrRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#x}:{:#x}]", self.start, self.end)
    }
}
