//! Scenario files: one bridge, one memory model, and the traffic offered to
//! it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tag_bridge::{Addr, BridgeConfig, Cycles, Tick};
use thiserror::Error;

/// A complete simulation input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    /// Bridge parameters.
    pub bridge: BridgeConfig,
    /// Memory model behind the bridge.
    pub memory: MemorySpec,
    /// Accesses issued by the traffic generator, in issue order.
    pub traffic: Vec<TrafficItem>,
}

/// Memory model parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemorySpec {
    /// Service latency, in bridge clock cycles.
    pub latency: Cycles,
    /// Refuse every Nth timed request; zero never refuses.
    pub refuse_every: u32,
}

/// Kind of access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// Read answered with the stored bytes.
    Read,
    /// Write answered with an acknowledgement.
    Write,
    /// Write that is never answered.
    Writeback,
}

/// Protocol an access is issued with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Queued and forwarded through the timed protocol.
    #[default]
    Timing,
    /// Forwarded synchronously with a latency estimate.
    Atomic,
    /// Performed instantly, without timing effects.
    Functional,
}

/// One access offered to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficItem {
    /// Access kind.
    pub kind: AccessKind,
    /// Start address.
    pub addr: Addr,
    /// Access size in bytes.
    #[serde(default = "default_access_size")]
    pub size: u64,
    /// Earliest issue tick.
    #[serde(default)]
    pub at: Tick,
    /// Issue protocol.
    #[serde(default)]
    pub mode: AccessMode,
    /// Byte written by writes, repeated over the access.
    #[serde(default)]
    pub fill: u8,
}

const fn default_access_size() -> u64 {
    8
}

/// Failure to load a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Scenario path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a valid scenario.
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),
    /// Traffic is not listed in issue order.
    #[error("traffic item {index} issues at tick {at}, before its predecessor")]
    Unordered {
        /// Position of the offending item.
        index: usize,
        /// Its issue tick.
        at: Tick,
    },
}

impl Scenario {
    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses a scenario from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] if the text is not a well-formed scenario.
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(text)?;
        scenario.check_order()?;
        Ok(scenario)
    }

    fn check_order(&self) -> Result<(), ScenarioError> {
        for (index, pair) in self.traffic.windows(2).enumerate() {
            if pair[1].at < pair[0].at {
                return Err(ScenarioError::Unordered {
                    index: index + 1,
                    at: pair[1].at,
                });
            }
        }
        Ok(())
    }
}
