//! Trace generation: randomized protocol choices packed onto circuit pages.
//!
//! Each requested routing distance is an independent segment with its own
//! [`ChainAllocator`] and local page sequence. Segments are concatenated and
//! their pages renumbered so that circuit indices are global and gapless.

use log::{debug, info};
use rand::Rng;

use crate::chain::{Chain, ChainAllocator};
use crate::circuit::{CircuitPage, Gate};
use crate::error::{QkdError, Result};
use crate::protocol::{Basis, Protocol};
use crate::record::RunRecord;

/// Records and sealed pages produced by a generation pass.
#[derive(Debug, Clone)]
pub struct Trace {
    pub protocol: Protocol,
    pub records: Vec<RunRecord>,
    pub pages: Vec<CircuitPage>,
}

impl Trace {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Check the page sealing invariant: one sealed, non-empty page per
    /// distinct circuit index, and each page encodes exactly the runs that
    /// reference it.
    pub fn verify(&self) -> Result<()> {
        let mut expected = 0;
        for r in &self.records {
            let end = r
                .circuit_index
                .checked_add(1)
                .ok_or(QkdError::CircuitIndexOverflow(r.circuit_index))?;
            expected = expected.max(end);
        }
        if self.pages.len() != expected {
            return Err(QkdError::PageCountMismatch {
                pages: self.pages.len(),
                expected,
            });
        }

        let mut referenced = vec![0usize; expected];
        for r in &self.records {
            referenced[r.circuit_index] += 1;
        }

        for (i, page) in self.pages.iter().enumerate() {
            if !page.is_sealed() {
                return Err(QkdError::UnsealedPage(i));
            }
            if referenced[i] == 0 {
                return Err(QkdError::EmptyPage(i));
            }
            if page.index() != i {
                return Err(QkdError::PageIndexMismatch {
                    position: i,
                    index: page.index(),
                });
            }
            if page.runs() != referenced[i] {
                return Err(QkdError::RunCountMismatch {
                    page: i,
                    runs: page.runs(),
                    records: referenced[i],
                });
            }
        }
        Ok(())
    }
}

/// Packs protocol runs onto circuit pages over a fixed chain.
pub struct TraceGenerator<'a> {
    chain: &'a Chain,
    protocol: Protocol,
}

impl<'a> TraceGenerator<'a> {
    pub fn new(chain: &'a Chain, protocol: Protocol) -> Self {
        Self { chain, protocol }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Register width of every page: the curated chain for routed protocols,
    /// the whole device for Id-BB84.
    pub fn register_width(&self) -> usize {
        if self.protocol.routes_along_chain() {
            self.chain.capacity()
        } else {
            self.chain.device_qubits()
        }
    }

    /// Reject requests that cannot be packed at all.
    pub fn validate(&self, lengths: &[usize], runs: usize) -> Result<()> {
        if lengths.is_empty() {
            return Err(QkdError::NoLengths);
        }
        if runs == 0 {
            return Err(QkdError::ZeroRuns);
        }
        let max = self.chain.max_length();
        for &length in lengths {
            if length == 0 {
                return Err(QkdError::ZeroLength);
            }
            if self.protocol.routes_along_chain() && length > max {
                return Err(QkdError::LengthExceedsChain { length, max });
            }
        }
        Ok(())
    }

    /// Generate `runs` trials for every requested length, in order.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        lengths: &[usize],
        runs: usize,
        rng: &mut R,
    ) -> Result<Trace> {
        self.validate(lengths, runs)?;

        let mut records = Vec::with_capacity(lengths.len() * runs);
        let mut pages = Vec::new();

        for &length in lengths {
            let offset = pages.len();
            let (seg_records, seg_pages) = self.generate_segment(length, runs, rng);
            debug!(
                "length {length}: {} runs on {} page(s) starting at circuit {offset}",
                seg_records.len(),
                seg_pages.len()
            );
            records.extend(seg_records.into_iter().map(|mut r| {
                r.circuit_index += offset;
                r
            }));
            pages.extend(seg_pages.into_iter().map(|mut p| {
                p.renumber(p.index() + offset);
                p
            }));
        }

        let trace = Trace {
            protocol: self.protocol,
            records,
            pages,
        };
        trace.verify()?;

        info!(
            "{}: generated {} runs on {} circuit page(s) of {} qubits",
            self.protocol,
            trace.records.len(),
            trace.page_count(),
            self.register_width()
        );
        Ok(trace)
    }

    /// One length with a private cursor; circuit indices are segment-local.
    fn generate_segment<R: Rng + ?Sized>(
        &self,
        length: usize,
        runs: usize,
        rng: &mut R,
    ) -> (Vec<RunRecord>, Vec<CircuitPage>) {
        let width = self.register_width();
        let mut alloc = ChainAllocator::new(width);
        let mut records = Vec::with_capacity(runs);
        let mut pages = Vec::new();
        let mut page = CircuitPage::new(0, width);

        for _ in 0..runs {
            let alice_basis = Basis::random(rng);
            let bob_basis = Basis::random(rng);
            let alice_bit = self
                .protocol
                .alice_bit_known_at_preparation()
                .then(|| rng.random_range(0..=1u8));

            let start = alloc.position();
            let virtual_qubit =
                self.encode_run(&mut page, start, length, alice_basis, bob_basis, alice_bit);
            page.mark_run();

            records.push(RunRecord {
                length,
                alice_basis,
                bob_basis,
                alice_bit,
                bob_bit: None,
                virtual_qubit,
                classical_bit_index: alloc.classical_bit(),
                circuit_index: pages.len(),
            });

            let rollover = if self.protocol.routes_along_chain() {
                alloc.advance_routed(virtual_qubit, length)
            } else {
                alloc.advance_in_place()
            };
            if rollover {
                page.seal();
                let next = CircuitPage::new(pages.len() + 1, width);
                pages.push(std::mem::replace(&mut page, next));
            }
        }

        if page.runs() > 0 {
            page.seal();
            pages.push(page);
        }
        (records, pages)
    }

    /// Append one run's gates at `pos` and return the qubit Bob measures.
    fn encode_run(
        &self,
        page: &mut CircuitPage,
        pos: usize,
        length: usize,
        alice_basis: Basis,
        bob_basis: Basis,
        alice_bit: Option<u8>,
    ) -> usize {
        let measured = match self.protocol {
            Protocol::Bb84 => {
                prepare(page, pos, alice_basis, alice_bit);
                for q in pos..pos + length {
                    page.push(Gate::Swap(q, q + 1));
                }
                pos + length
            }
            Protocol::Bbm92 => {
                page.push(Gate::H(pos));
                page.push(Gate::Cx(pos, pos + 1));
                if alice_basis == Basis::X {
                    page.push(Gate::H(pos));
                }
                // Alice's half stays on `pos`; Bob's half travels to pos + length.
                for q in pos + 1..pos + length {
                    page.push(Gate::Swap(q, q + 1));
                }
                pos + length
            }
            Protocol::IdBb84 => {
                prepare(page, pos, alice_basis, alice_bit);
                for _ in 0..length {
                    page.push(Gate::Id(pos));
                }
                pos
            }
        };
        if bob_basis == Basis::X {
            page.push(Gate::H(measured));
        }
        measured
    }
}

/// Prepare |bit⟩ in Alice's basis on qubit `pos`.
fn prepare(page: &mut CircuitPage, pos: usize, basis: Basis, bit: Option<u8>) {
    if bit == Some(1) {
        page.push(Gate::X(pos));
    }
    if basis == Basis::X {
        page.push(Gate::H(pos));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0x5eed)
    }

    #[test]
    fn test_bb84_capacity_16_length_3() {
        let chain = Chain::linear(16).unwrap();
        let trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3], 5, &mut rng())
            .unwrap();

        assert_eq!(trace.records.len(), 5);
        // Four runs fit per page (measured at 3, 7, 11, 15); the fifth rolls over.
        assert_eq!(trace.page_count(), 2);
        let measured: Vec<usize> = trace.records.iter().map(|r| r.virtual_qubit).collect();
        assert_eq!(measured, vec![3, 7, 11, 15, 3]);
        let cls: Vec<usize> = trace.records.iter().map(|r| r.classical_bit_index).collect();
        assert_eq!(cls, vec![0, 1, 2, 3, 0]);
        for r in &trace.records {
            assert!(r.alice_bit.is_some());
            assert!(r.bob_bit.is_none());
        }
    }

    #[test]
    fn test_single_page_when_runs_fit() {
        let chain = Chain::linear(16).unwrap();
        let trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3], 4, &mut rng())
            .unwrap();
        assert_eq!(trace.page_count(), 1);
        assert!(trace.records.iter().all(|r| r.circuit_index == 0));
    }

    #[test]
    fn test_record_count_and_indices_in_range() {
        let chain = Chain::for_topology(crate::chain::IBM_SHERBROOKE).unwrap();
        let lengths = [1, 2, 5, 13, 40, 108];
        for protocol in Protocol::ALL {
            let trace = TraceGenerator::new(&chain, protocol)
                .generate(&lengths, 37, &mut rng())
                .unwrap();
            assert_eq!(trace.records.len(), lengths.len() * 37);
            assert!(
                trace
                    .records
                    .iter()
                    .all(|r| r.circuit_index < trace.page_count())
            );
            trace.verify().unwrap();
        }
    }

    #[test]
    fn test_each_length_starts_on_fresh_page() {
        let chain = Chain::linear(16).unwrap();
        let trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[2, 2], 1, &mut rng())
            .unwrap();
        assert_eq!(trace.page_count(), 2);
        assert_eq!(trace.records[0].circuit_index, 0);
        assert_eq!(trace.records[1].circuit_index, 1);
        assert_eq!(trace.records[1].virtual_qubit, 2);
    }

    #[test]
    fn test_max_length_boundary() {
        let chain = Chain::linear(16).unwrap();
        let generator = TraceGenerator::new(&chain, Protocol::Bb84);
        let trace = generator.generate(&[15], 3, &mut rng()).unwrap();
        // Every run fills the chain, so each gets its own page.
        assert_eq!(trace.page_count(), 3);

        let err = generator.generate(&[16], 3, &mut rng()).unwrap_err();
        assert!(matches!(
            err,
            QkdError::LengthExceedsChain { length: 16, max: 15 }
        ));
    }

    #[test]
    fn test_rejects_degenerate_requests() {
        let chain = Chain::linear(8).unwrap();
        let generator = TraceGenerator::new(&chain, Protocol::Bbm92);
        assert!(matches!(
            generator.generate(&[], 3, &mut rng()),
            Err(QkdError::NoLengths)
        ));
        assert!(matches!(
            generator.generate(&[2], 0, &mut rng()),
            Err(QkdError::ZeroRuns)
        ));
        assert!(matches!(
            generator.generate(&[2, 0], 3, &mut rng()),
            Err(QkdError::ZeroLength)
        ));
    }

    #[test]
    fn test_bbm92_leaves_alice_pending_and_routes_one_leg() {
        let chain = Chain::linear(16).unwrap();
        let trace = TraceGenerator::new(&chain, Protocol::Bbm92)
            .generate(&[4], 1, &mut rng())
            .unwrap();
        let r = &trace.records[0];
        assert_eq!(r.alice_bit, None);
        assert_eq!(r.virtual_qubit, 4);

        let gates = trace.pages[0].gates();
        assert_eq!(gates[0], Gate::H(0));
        assert_eq!(gates[1], Gate::Cx(0, 1));
        let swaps: Vec<&Gate> = gates
            .iter()
            .filter(|g| matches!(g, Gate::Swap(..)))
            .collect();
        assert_eq!(
            swaps,
            vec![&Gate::Swap(1, 2), &Gate::Swap(2, 3), &Gate::Swap(3, 4)]
        );
    }

    #[test]
    fn test_bb84_gates_match_record() {
        let chain = Chain::linear(16).unwrap();
        let trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[2], 1, &mut rng())
            .unwrap();
        let r = &trace.records[0];
        let gates = trace.pages[0].gates();

        let mut expected = Vec::new();
        if r.alice_bit == Some(1) {
            expected.push(Gate::X(0));
        }
        if r.alice_basis == Basis::X {
            expected.push(Gate::H(0));
        }
        expected.push(Gate::Swap(0, 1));
        expected.push(Gate::Swap(1, 2));
        if r.bob_basis == Basis::X {
            expected.push(Gate::H(2));
        }
        assert_eq!(gates, expected.as_slice());
    }

    #[test]
    fn test_id_bb84_uses_device_width_and_stays_in_place() {
        let chain = Chain::new("small", vec![0, 1, 2], 5).unwrap();
        let generator = TraceGenerator::new(&chain, Protocol::IdBb84);
        assert_eq!(generator.register_width(), 5);

        // Length is not bounded by the chain because the qubit never moves.
        let trace = generator.generate(&[10], 7, &mut rng()).unwrap();
        assert_eq!(trace.page_count(), 2);
        let measured: Vec<usize> = trace.records.iter().map(|r| r.virtual_qubit).collect();
        assert_eq!(measured, vec![0, 1, 2, 3, 4, 0, 1]);
        let ids = trace.pages[0]
            .gates()
            .iter()
            .filter(|g| matches!(g, Gate::Id(0)))
            .count();
        assert_eq!(ids, 10);
        assert!(trace.pages.iter().all(|p| p.width() == 5));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let chain = Chain::linear(32).unwrap();
        let generator = TraceGenerator::new(&chain, Protocol::Bb84);
        let a = generator.generate(&[1, 4], 20, &mut rng()).unwrap();
        let b = generator.generate(&[1, 4], 20, &mut rng()).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.pages, b.pages);
    }

    #[test]
    fn test_verify_detects_missing_page() {
        let chain = Chain::linear(16).unwrap();
        let mut trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3], 5, &mut rng())
            .unwrap();
        trace.pages.pop();
        assert!(matches!(
            trace.verify(),
            Err(QkdError::PageCountMismatch {
                pages: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_verify_detects_empty_page() {
        let chain = Chain::linear(16).unwrap();
        let mut trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3, 3], 4, &mut rng())
            .unwrap();
        assert_eq!(trace.page_count(), 2);
        for r in trace.records.iter_mut().take(4) {
            r.circuit_index = 1;
        }
        assert!(matches!(trace.verify(), Err(QkdError::EmptyPage(0))));
    }

    #[test]
    fn test_verify_detects_unsealed_page() {
        let chain = Chain::linear(16).unwrap();
        let mut trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3], 2, &mut rng())
            .unwrap();
        let mut open = CircuitPage::new(0, 16);
        open.mark_run();
        open.mark_run();
        trace.pages[0] = open;
        assert!(matches!(trace.verify(), Err(QkdError::UnsealedPage(0))));
    }

    #[test]
    fn test_verify_detects_misnumbered_page() {
        let chain = Chain::linear(16).unwrap();
        let mut trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3], 5, &mut rng())
            .unwrap();
        trace.pages[1].renumber(4);
        assert!(matches!(
            trace.verify(),
            Err(QkdError::PageIndexMismatch {
                position: 1,
                index: 4
            })
        ));
    }

    #[test]
    fn test_verify_rejects_overflowing_circuit_index() {
        let chain = Chain::linear(16).unwrap();
        let mut trace = TraceGenerator::new(&chain, Protocol::Bb84)
            .generate(&[3], 2, &mut rng())
            .unwrap();
        trace.records[1].circuit_index = usize::MAX;
        let err = trace.verify().unwrap_err();
        assert!(matches!(err, QkdError::CircuitIndexOverflow(usize::MAX)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Precondition);
    }
}
