//! Per-run protocol records.

use serde::{Deserialize, Serialize};

use crate::protocol::Basis;

/// Persisted shape of a record:
/// `(length, alice_basis, bob_basis, alice_bit, bob_bit, virtual_qubit, classical_bit, circuit_index)`.
pub type RecordTuple = (
    usize,
    Basis,
    Basis,
    Option<u8>,
    Option<u8>,
    usize,
    usize,
    usize,
);

/// One protocol trial.
///
/// `None` in a bit field means the value is pending backend measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RecordTuple", try_from = "RecordTuple")]
pub struct RunRecord {
    /// Routing distance requested for this trial.
    pub length: usize,
    pub alice_basis: Basis,
    pub bob_basis: Basis,
    pub alice_bit: Option<u8>,
    pub bob_bit: Option<u8>,
    /// Virtual qubit on which Bob's basis choice and measurement act.
    pub virtual_qubit: usize,
    /// Position within the page's classical readout.
    pub classical_bit_index: usize,
    pub circuit_index: usize,
}

impl RunRecord {
    /// True once no field is pending.
    pub fn is_reconciled(&self) -> bool {
        self.alice_bit.is_some() && self.bob_bit.is_some()
    }

    pub fn bases_match(&self) -> bool {
        self.alice_basis == self.bob_basis
    }
}

impl From<RunRecord> for RecordTuple {
    fn from(r: RunRecord) -> Self {
        (
            r.length,
            r.alice_basis,
            r.bob_basis,
            r.alice_bit,
            r.bob_bit,
            r.virtual_qubit,
            r.classical_bit_index,
            r.circuit_index,
        )
    }
}

impl TryFrom<RecordTuple> for RunRecord {
    type Error = String;

    fn try_from(t: RecordTuple) -> Result<Self, Self::Error> {
        let (length, alice_basis, bob_basis, alice_bit, bob_bit, virtual_qubit, cl, circuit) = t;
        for bit in [alice_bit, bob_bit].into_iter().flatten() {
            if bit > 1 {
                return Err(format!("bit value {bit} is not 0 or 1"));
            }
        }
        Ok(Self {
            length,
            alice_basis,
            bob_basis,
            alice_bit,
            bob_bit,
            virtual_qubit,
            classical_bit_index: cl,
            circuit_index: circuit,
        })
    }
}
