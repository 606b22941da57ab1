//! Execution backend interface.
//!
//! A backend consumes the sealed circuit pages together with the qubit layout
//! and returns exactly one measurement [`Outcome`] per page, in page order.
//! Outcomes are stored most-significant-qubit first, the way device counts
//! report them.

pub mod ideal;
pub mod replay;

use std::collections::BTreeMap;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::circuit::CircuitPage;
use crate::error::{QkdError, Result};
use crate::protocol::Protocol;

pub use ideal::IdealBackend;
pub use replay::ReplayBackend;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Single-shot measurement of a whole page register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Outcome {
    /// Bits as reported: index 0 is the highest qubit.
    bits: Vec<u8>,
}

impl Outcome {
    /// Parse a `0`/`1` bitstring. Whitespace separating classical registers
    /// is ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let mut bits = Vec::with_capacity(s.len());
        for c in s.chars().filter(|c| !c.is_whitespace()) {
            match c {
                '0' => bits.push(0),
                '1' => bits.push(1),
                _ => {
                    return Err(QkdError::MalformedOutcome(format!(
                        "unexpected character '{c}' in '{s}'"
                    )));
                }
            }
        }
        if bits.is_empty() {
            return Err(QkdError::MalformedOutcome("empty bitstring".to_string()));
        }
        Ok(Self { bits })
    }

    /// Pick the most frequent bitstring of a counts map. Ties go to the
    /// lexicographically smallest bitstring.
    pub fn from_counts(counts: &BTreeMap<String, u64>) -> Result<Self> {
        let mut best: Option<(&String, u64)> = None;
        for (bits, &n) in counts {
            if best.is_none_or(|(_, m)| n > m) {
                best = Some((bits, n));
            }
        }
        match best {
            Some((bits, _)) => Self::parse(bits),
            None => Err(QkdError::MalformedOutcome("empty counts".to_string())),
        }
    }

    /// Build from bits indexed by qubit position (index 0 = qubit 0).
    pub fn from_qubit_bits(by_qubit: &[u8]) -> Self {
        Self {
            bits: by_qubit.iter().rev().map(|&b| b & 1).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Bit measured on virtual qubit `qubit`, reading the stored string in
    /// reverse.
    pub fn bit(&self, qubit: usize) -> Option<u8> {
        let n = self.bits.len();
        if qubit < n {
            Some(self.bits[n - 1 - qubit])
        } else {
            None
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.bits {
            f.write_str(if b == 1 { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Outcome {
    type Error = QkdError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Outcome> for String {
    fn from(o: Outcome) -> Self {
        o.to_string()
    }
}

// ---------------------------------------------------------------------------
// Layout and execution mode
// ---------------------------------------------------------------------------

/// Virtual-to-physical qubit assignment submitted with the pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub topology: String,
    /// Register width of the submitted pages.
    pub width: usize,
    /// Physical qubit of each virtual position; `None` maps the register
    /// onto the device identically.
    pub virtual_to_physical: Option<Vec<u32>>,
}

impl Layout {
    /// Routed protocols pin virtual position `i` to `chain[i]`; Id-BB84 uses
    /// the whole device as is.
    pub fn for_protocol(chain: &Chain, protocol: Protocol) -> Self {
        if protocol.routes_along_chain() {
            Self {
                topology: chain.topology().to_string(),
                width: chain.capacity(),
                virtual_to_physical: Some(chain.qubits().to_vec()),
            }
        } else {
            Self {
                topology: chain.topology().to_string(),
                width: chain.device_qubits(),
                virtual_to_physical: None,
            }
        }
    }

    pub fn physical(&self, virtual_qubit: usize) -> Option<u32> {
        match &self.virtual_to_physical {
            Some(map) => map.get(virtual_qubit).copied(),
            None => (virtual_qubit < self.width).then_some(virtual_qubit as u32),
        }
    }
}

/// Where the circuits are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Local noisy simulation.
    #[default]
    Local,
    /// Remote hardware.
    Remote,
}

impl ExecutionMode {
    /// File name under which outcomes of this mode are stored in an
    /// experiment directory.
    pub fn results_file_name(self) -> &'static str {
        match self {
            ExecutionMode::Local => "results_local.json",
            ExecutionMode::Remote => "results_device.json",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = QkdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "sim" | "simulation" => Ok(Self::Local),
            "remote" | "device" | "hardware" => Ok(Self::Remote),
            _ => Err(QkdError::UnknownMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Executes circuit pages and reports one outcome per page.
pub trait Backend {
    /// Short identifier used in logs and metadata.
    fn name(&self) -> &str;

    /// Execute `pages` in order. Implementations must preserve page order.
    fn execute(
        &mut self,
        pages: &[CircuitPage],
        layout: &Layout,
        mode: ExecutionMode,
    ) -> Result<Vec<Outcome>>;
}

/// Run a backend and check it honoured the one-outcome-per-page contract.
pub fn run_backend(
    backend: &mut dyn Backend,
    pages: &[CircuitPage],
    layout: &Layout,
    mode: ExecutionMode,
) -> Result<Vec<Outcome>> {
    info!(
        "executing {} circuit(s) on backend '{}' ({mode})",
        pages.len(),
        backend.name()
    );
    let outcomes = backend.execute(pages, layout, mode)?;
    if outcomes.len() != pages.len() {
        return Err(QkdError::OutcomeCountMismatch {
            expected: pages.len(),
            got: outcomes.len(),
        });
    }
    Ok(outcomes)
}
