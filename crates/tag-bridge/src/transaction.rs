//! Narrow view of the transaction object model consumed by the bridge.

use crate::{Addr, AddrRange, Tick};

/// Stable identity of an in-flight transaction.
///
/// A request and the response it turns into share the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TransactionId(pub u64);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Routing identity of an agent port as seen by interconnect hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PortId(pub u32);

/// Traffic-class identifier attached once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TrafficTag(pub u32);

impl std::fmt::Display for TrafficTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a timed handoff between two ports.
///
/// A refused transaction is handed back so the sender keeps ownership until
/// it is allowed to try again.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Admission<T> {
    /// The receiver took ownership of the transaction.
    Accepted,
    /// The receiver is out of space; resubmit only after a retry.
    Refused(T),
}

impl<T> Admission<T> {
    /// Returns `true` for [`Admission::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Returns the refused transaction, if any.
    #[must_use]
    pub fn into_refused(self) -> Option<T> {
        match self {
            Self::Accepted => None,
            Self::Refused(txn) => Some(txn),
        }
    }
}

/// Treatment of a transaction's first/last word delay hints when it crosses
/// the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimingHintPolicy {
    /// Clear both hints.
    Zero,
    /// Leave both hints untouched.
    Preserve,
    /// Add the bridge's forwarding delay to both hints.
    #[default]
    Accumulate,
}

impl TimingHintPolicy {
    /// Applies the policy to `txn` for a crossing that costs `delay` ticks.
    pub fn apply<T: Transaction + ?Sized>(self, txn: &mut T, delay: Tick) {
        match self {
            Self::Zero => txn.set_word_delays(0, 0),
            Self::Preserve => {}
            Self::Accumulate => {
                let (first, last) = txn.word_delays();
                txn.set_word_delays(first.saturating_add(delay), last.saturating_add(delay));
            }
        }
    }
}

/// Transaction operations the bridge relies on.
pub trait Transaction {
    /// Identity shared by a request and its response.
    fn id(&self) -> TransactionId;

    /// Start address of the access.
    fn addr(&self) -> Addr;

    /// Access size in bytes.
    fn size(&self) -> u64;

    /// Returns `true` when the command requires a response.
    fn needs_response(&self) -> bool;

    /// Returns `true` when another agent has taken responsibility for
    /// responding.
    fn mem_inhibit_asserted(&self) -> bool;

    /// Returns `true` when a response will come back through the bridge.
    fn expects_response(&self) -> bool {
        self.needs_response() && !self.mem_inhibit_asserted()
    }

    /// Routing identity of the agent that sent this transaction.
    fn src(&self) -> PortId;

    /// Routing identity the transaction is addressed to, if set.
    fn dest(&self) -> Option<PortId>;

    /// Overwrites the destination routing identity.
    fn set_dest(&mut self, dest: PortId);

    /// Traffic-class tag, once attached.
    fn traffic_tag(&self) -> Option<TrafficTag>;

    /// Attaches the traffic-class tag.
    fn set_traffic_tag(&mut self, tag: TrafficTag);

    /// First and last word delay hints.
    fn word_delays(&self) -> (Tick, Tick);

    /// Overwrites the first and last word delay hints.
    fn set_word_delays(&mut self, first: Tick, last: Tick);

    /// Applies this functional access to an in-flight transaction.
    ///
    /// A read takes its data from `other` when `other` holds all of it. A
    /// write copies its bytes into whatever part of `other` it overlaps so
    /// the queued transaction does not later overwrite them.
    ///
    /// Returns `true` when the access is complete and must not travel further.
    fn check_functional(&mut self, other: &mut Self) -> bool;

    /// Turns a request into its response in place.
    fn make_response(&mut self);

    /// Address range touched by this transaction.
    fn footprint(&self) -> AddrRange {
        AddrRange::from_span(self.addr(), self.size())
    }
}
