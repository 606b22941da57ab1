//! Physical qubit chains and the per-page cursor that packs runs onto them.
//!
//! A [`Chain`] is an ordered list of physical qubit ids on a device such that
//! consecutive entries are coupled, so a state can be swapped from virtual
//! position `i` to `i + 1`. The [`ChainAllocator`] tracks where the next run
//! starts inside the currently open circuit page.

use serde::{Deserialize, Serialize};

use crate::error::{QkdError, Result};

/// Identifier of the only built-in topology.
pub const IBM_SHERBROOKE: &str = "ibm_sherbrooke";

/// Number of physical qubits on ibm_sherbrooke.
pub const SHERBROOKE_QUBITS: usize = 127;

/// Ordered sequence of physical qubit positions, fixed per topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    topology: String,
    qubits: Vec<u32>,
    device_qubits: usize,
}

impl Chain {
    /// Build a chain from explicit physical qubit ids.
    ///
    /// `device_qubits` is the full device register width; it is raised to
    /// cover every id in `qubits` if smaller.
    pub fn new(topology: impl Into<String>, qubits: Vec<u32>, device_qubits: usize) -> Result<Self> {
        let topology = topology.into();
        if qubits.is_empty() {
            return Err(QkdError::UnknownTopology(format!("{topology} (empty chain)")));
        }
        let widest = qubits.iter().map(|&q| q as usize + 1).max().unwrap_or(0);
        Ok(Self {
            topology,
            qubits,
            device_qubits: device_qubits.max(widest),
        })
    }

    /// A chain `0, 1, …, capacity-1` on a device of the same width.
    pub fn linear(capacity: usize) -> Result<Self> {
        let qubits = (0..capacity as u32).collect();
        Self::new(format!("linear_{capacity}"), qubits, capacity)
    }

    /// Look up the curated chain of a known device.
    pub fn for_topology(name: &str) -> Result<Self> {
        match name {
            IBM_SHERBROOKE => Self::new(IBM_SHERBROOKE, sherbrooke_chain(), SHERBROOKE_QUBITS),
            _ => Err(QkdError::UnknownTopology(name.to_string())),
        }
    }

    pub fn topology(&self) -> &str {
        &self.topology
    }

    pub fn qubits(&self) -> &[u32] {
        &self.qubits
    }

    /// Number of addressable chain positions.
    pub fn capacity(&self) -> usize {
        self.qubits.len()
    }

    /// Width of the whole device register.
    pub fn device_qubits(&self) -> usize {
        self.device_qubits
    }

    /// Largest routing distance that fits on an empty page.
    pub fn max_length(&self) -> usize {
        self.capacity() - 1
    }
}

/// Snake through the heavy-hex lattice of ibm_sherbrooke, row by row,
/// hopping between rows through the bridge qubits.
fn sherbrooke_chain() -> Vec<u32> {
    let mut chain: Vec<u32> = (0..=13).rev().collect();
    chain.push(14);
    chain.extend(18..=32);
    chain.push(36);
    chain.extend((37..=51).rev());
    chain.push(52);
    chain.extend(56..=70);
    chain.push(74);
    chain.extend((75..=89).rev());
    chain.push(90);
    chain.extend(94..=108);
    chain.push(112);
    chain.extend((113..=126).rev());
    chain
}

/// Cursor over the currently open page: the virtual qubit where the next run
/// starts and the classical bit it will occupy.
#[derive(Debug, Clone)]
pub struct ChainAllocator {
    capacity: usize,
    pos: usize,
    cl: usize,
}

impl ChainAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pos: 0,
            cl: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn classical_bit(&self) -> usize {
        self.cl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Advance past a routed run whose state ended at virtual qubit `end`.
    ///
    /// Returns `true` when another run of `length` would not fit, in which case
    /// the cursor has been reset and the caller must seal the page.
    pub fn advance_routed(&mut self, end: usize, length: usize) -> bool {
        // Next run would measure at end + 1 + length; keep it within capacity - 1.
        if end + length + 2 > self.capacity {
            self.reset();
            true
        } else {
            self.pos = end + 1;
            self.cl += 1;
            false
        }
    }

    /// Advance past a run that stayed on its own qubit.
    ///
    /// Returns `true` when the register is exhausted and the page must be sealed.
    pub fn advance_in_place(&mut self) -> bool {
        self.pos += 1;
        self.cl += 1;
        if self.pos >= self.capacity {
            self.reset();
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.cl = 0;
    }
}
