//! Fatal bridge errors and configuration errors.

use thiserror::Error;

use crate::{Addr, Direction, TrafficTag, TransactionId};

/// Identifies one of the two bridge ports by the agent it faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Side {
    /// Port facing the agent that issues requests.
    Upstream,
    /// Port facing the agent that services requests.
    Downstream,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream => f.write_str("upstream"),
            Self::Downstream => f.write_str("downstream"),
        }
    }
}

/// Rejected construction-time configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A queue was configured without any slots.
    #[error("{direction} queue capacity must be non-zero")]
    ZeroCapacity {
        /// Queue that was misconfigured.
        direction: Direction,
    },
    /// The clock period was zero.
    #[error("clock period must be non-zero")]
    ZeroClockPeriod,
    /// An address range ends before it starts.
    #[error("address range {start:#x}..={end:#x} is inverted")]
    InvertedRange {
        /// Inclusive start address.
        start: Addr,
        /// Inclusive end address.
        end: Addr,
    },
}

/// Unrecoverable bridge conditions.
///
/// Every variant terminates the simulation; ordinary backpressure is reported
/// through [`crate::Admission::Refused`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A port has no agent bound at initialization or use.
    #[error("both ports of a bridge must be connected ({side} is not)")]
    Unconnected {
        /// Port lacking a peer.
        side: Side,
    },
    /// A transaction reached the tagging boundary already tagged.
    #[error("transaction {id} already carries traffic tag {existing}")]
    AlreadyTagged {
        /// Offending transaction.
        id: TransactionId,
        /// Tag found on arrival.
        existing: TrafficTag,
    },
    /// A response arrived without the state saved for its request.
    #[error("response {id} has no saved request state")]
    MissingRequestState {
        /// Offending transaction.
        id: TransactionId,
    },
    /// A second request state was saved for an in-flight transaction.
    #[error("request state for {id} is already saved")]
    DuplicateRequestState {
        /// Offending transaction.
        id: TransactionId,
    },
    /// A peer signalled retry although no handoff had been refused.
    #[error("{direction} retry received with no refused handoff outstanding")]
    SpuriousRetry {
        /// Queue the retry was addressed to.
        direction: Direction,
    },
    /// The upstream agent submitted while it was owed a retry.
    #[error("request received while a retry is pending")]
    RequestDuringRetry,
    /// A queue was pushed past its configured capacity.
    #[error("{direction} queue exceeded its capacity of {capacity}")]
    QueueOverflow {
        /// Queue that overflowed.
        direction: Direction,
        /// Configured capacity.
        capacity: usize,
    },
    /// A response departed with no reservation outstanding.
    #[error("response departed with no reserved slot")]
    ReservationUnderflow,
    /// Construction-time configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Returns `true` when the error was caused by an adjacent agent breaking
    /// the port protocol rather than by bridge bookkeeping or setup.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyTagged { .. }
                | Self::MissingRequestState { .. }
                | Self::DuplicateRequestState { .. }
                | Self::SpuriousRetry { .. }
                | Self::RequestDuringRetry
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeError, ConfigError, Side};
    use crate::{Direction, TrafficTag, TransactionId};

    #[test]
    fn protocol_violations_are_classified() {
        assert!(BridgeError::RequestDuringRetry.is_protocol_violation());
        assert!(BridgeError::SpuriousRetry {
            direction: Direction::Response
        }
        .is_protocol_violation());
        assert!(BridgeError::AlreadyTagged {
            id: TransactionId(1),
            existing: TrafficTag(3)
        }
        .is_protocol_violation());
        assert!(!BridgeError::ReservationUnderflow.is_protocol_violation());
        assert!(!BridgeError::Unconnected {
            side: Side::Upstream
        }
        .is_protocol_violation());
    }

    #[test]
    fn messages_name_the_failing_side() {
        let err = BridgeError::Unconnected {
            side: Side::Downstream,
        };
        assert_eq!(
            err.to_string(),
            "both ports of a bridge must be connected (downstream is not)"
        );
        let err = BridgeError::QueueOverflow {
            direction: Direction::Request,
            capacity: 4,
        };
        assert_eq!(err.to_string(), "request queue exceeded its capacity of 4");
    }

    #[test]
    fn config_errors_convert_transparently() {
        let err = BridgeError::from(ConfigError::ZeroClockPeriod);
        assert_eq!(err.to_string(), "clock period must be non-zero");
    }
}
