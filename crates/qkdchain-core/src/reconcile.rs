//! Fill pending measurement fields of run records from backend outcomes.

use log::info;

use crate::backend::Outcome;
use crate::error::{QkdError, Result};
use crate::record::RunRecord;

/// Set `bob_bit` (and a pending `alice_bit`) of every record from the outcome
/// of its circuit page.
///
/// Bob's bit is read at `virtual_qubit`. A pending Alice bit belongs to the
/// entangled-pair case, where Alice's half sits `length` positions behind
/// Bob's on the same page. Records are only modified once every lookup has
/// succeeded.
pub fn reconcile(records: &mut [RunRecord], outcomes: &[Outcome]) -> Result<()> {
    let mut expected = 0;
    for r in records.iter() {
        let end = r
            .circuit_index
            .checked_add(1)
            .ok_or(QkdError::CircuitIndexOverflow(r.circuit_index))?;
        expected = expected.max(end);
    }
    if outcomes.len() < expected {
        return Err(QkdError::MissingOutcomes {
            expected,
            got: outcomes.len(),
        });
    }

    let mut updates = Vec::with_capacity(records.len());
    for r in records.iter() {
        let outcome = &outcomes[r.circuit_index];
        let bob = read(outcome, r.circuit_index, r.virtual_qubit)?;
        let alice = match r.alice_bit {
            Some(bit) => bit,
            None => {
                let position = r.virtual_qubit.checked_sub(r.length).ok_or(
                    QkdError::OutcomeOutOfRange {
                        circuit: r.circuit_index,
                        position: r.virtual_qubit,
                        width: outcome.width(),
                    },
                )?;
                read(outcome, r.circuit_index, position)?
            }
        };
        updates.push((alice, bob));
    }

    for (r, (alice, bob)) in records.iter_mut().zip(updates) {
        r.alice_bit = Some(alice);
        r.bob_bit = Some(bob);
    }
    info!(
        "reconciled {} record(s) against {} outcome(s)",
        records.len(),
        outcomes.len()
    );
    Ok(())
}

fn read(outcome: &Outcome, circuit: usize, position: usize) -> Result<u8> {
    outcome.bit(position).ok_or(QkdError::OutcomeOutOfRange {
        circuit,
        position,
        width: outcome.width(),
    })
}
