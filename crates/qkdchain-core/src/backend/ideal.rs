//! Noiseless reference executor for the protocol gate set.
//!
//! Tracks each qubit as one of the four BB84 states or as half of a |Φ+⟩
//! pair, which is all the generated pages ever produce. Gates outside that
//! closed set are rejected. An optional flip probability per SWAP models a
//! readout error that grows with routing distance. It acts on both swapped
//! qubits whatever their state, so |0⟩ and |1⟩ degrade alike.

use log::debug;
use rand::Rng;

use super::{Backend, ExecutionMode, Layout, Outcome};
use crate::circuit::{CircuitPage, Gate};
use crate::error::{QkdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QubitState {
    Zero,
    One,
    Plus,
    Minus,
    /// Half of a |Φ+⟩ pair; `rotated` once a Hadamard acted on this half.
    Bell { partner: usize, rotated: bool },
}

/// Executes pages exactly, drawing measurement randomness from `rng`.
pub struct IdealBackend<R: Rng> {
    rng: R,
    swap_flip_probability: f64,
}

impl<R: Rng> IdealBackend<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            swap_flip_probability: 0.0,
        }
    }

    /// Flip the readout of each swapped qubit with probability `p` on every
    /// SWAP.
    pub fn with_swap_flip_probability(mut self, p: f64) -> Self {
        self.swap_flip_probability = p.clamp(0.0, 1.0);
        self
    }

    fn run_page(&mut self, page: &CircuitPage) -> Result<Outcome> {
        let width = page.width();
        let mut state = vec![QubitState::Zero; width];
        let mut flipped = vec![false; width];

        let check = |q: usize| -> Result<usize> {
            if q < width {
                Ok(q)
            } else {
                Err(QkdError::Backend(format!(
                    "circuit {}: qubit {q} outside register of {width}",
                    page.index()
                )))
            }
        };
        let unsupported = |gate: Gate| {
            QkdError::Backend(format!(
                "circuit {}: '{gate}' leaves the supported state set",
                page.index()
            ))
        };

        for &gate in page.gates() {
            match gate {
                Gate::Id(q) => {
                    check(q)?;
                }
                Gate::X(q) => {
                    let q = check(q)?;
                    state[q] = match state[q] {
                        QubitState::Zero => QubitState::One,
                        QubitState::One => QubitState::Zero,
                        s @ (QubitState::Plus | QubitState::Minus) => s,
                        QubitState::Bell { .. } => return Err(unsupported(gate)),
                    };
                }
                Gate::H(q) => {
                    let q = check(q)?;
                    state[q] = match state[q] {
                        QubitState::Zero => QubitState::Plus,
                        QubitState::Plus => QubitState::Zero,
                        QubitState::One => QubitState::Minus,
                        QubitState::Minus => QubitState::One,
                        QubitState::Bell { partner, rotated } => QubitState::Bell {
                            partner,
                            rotated: !rotated,
                        },
                    };
                }
                Gate::Cx(c, t) => {
                    let (c, t) = (check(c)?, check(t)?);
                    match (state[c], state[t]) {
                        (QubitState::Zero, QubitState::Zero | QubitState::One) => {}
                        (QubitState::One, QubitState::Zero) => state[t] = QubitState::One,
                        (QubitState::One, QubitState::One) => state[t] = QubitState::Zero,
                        // X-eigenstates are invariant under the target's X.
                        (
                            QubitState::Zero | QubitState::One,
                            QubitState::Plus | QubitState::Minus,
                        ) => {}
                        (QubitState::Plus, QubitState::Zero) => {
                            state[c] = QubitState::Bell {
                                partner: t,
                                rotated: false,
                            };
                            state[t] = QubitState::Bell {
                                partner: c,
                                rotated: false,
                            };
                        }
                        _ => return Err(unsupported(gate)),
                    }
                }
                Gate::Swap(a, b) => {
                    let (a, b) = (check(a)?, check(b)?);
                    state.swap(a, b);
                    flipped.swap(a, b);
                    relink(&mut state, a, b);
                    let p = self.swap_flip_probability;
                    if p > 0.0 {
                        for q in [a, b] {
                            if self.rng.random_bool(p) {
                                flipped[q] = !flipped[q];
                            }
                        }
                    }
                }
            }
        }

        let mut bits: Vec<Option<u8>> = vec![None; width];
        for q in 0..width {
            if bits[q].is_some() {
                continue;
            }
            match state[q] {
                QubitState::Zero => bits[q] = Some(0),
                QubitState::One => bits[q] = Some(1),
                QubitState::Plus | QubitState::Minus => bits[q] = Some(self.coin()),
                QubitState::Bell { partner, rotated } => {
                    let partner_rotated = match state[partner] {
                        QubitState::Bell { rotated, .. } => rotated,
                        _ => {
                            return Err(QkdError::Backend(format!(
                                "circuit {}: dangling entangled partner {partner}",
                                page.index()
                            )));
                        }
                    };
                    let b = self.coin();
                    bits[q] = Some(b);
                    // Same local basis: perfectly correlated. Otherwise independent.
                    bits[partner] = Some(if rotated == partner_rotated {
                        b
                    } else {
                        self.coin()
                    });
                }
            }
        }

        let by_qubit: Vec<u8> = bits
            .into_iter()
            .zip(flipped)
            .map(|(b, f)| b.unwrap_or(0) ^ u8::from(f))
            .collect();
        Ok(Outcome::from_qubit_bits(&by_qubit))
    }

    fn coin(&mut self) -> u8 {
        u8::from(self.rng.random::<bool>())
    }
}

/// After swapping positions `a` and `b`, point entangled partners at the new
/// positions.
fn relink(state: &mut [QubitState], a: usize, b: usize) {
    let moved = |p: usize| {
        if p == a {
            b
        } else if p == b {
            a
        } else {
            p
        }
    };
    for q in [a, b] {
        if let QubitState::Bell { partner, rotated } = state[q] {
            let partner = moved(partner);
            state[q] = QubitState::Bell { partner, rotated };
            if partner != a && partner != b {
                if let QubitState::Bell { rotated: r, .. } = state[partner] {
                    state[partner] = QubitState::Bell {
                        partner: q,
                        rotated: r,
                    };
                }
            }
        }
    }
}

impl<R: Rng> Backend for IdealBackend<R> {
    fn name(&self) -> &str {
        "ideal"
    }

    fn execute(
        &mut self,
        pages: &[CircuitPage],
        layout: &Layout,
        mode: ExecutionMode,
    ) -> Result<Vec<Outcome>> {
        if mode == ExecutionMode::Remote {
            return Err(QkdError::Backend(
                "the ideal backend only runs locally".to_string(),
            ));
        }
        debug!(
            "ideal backend: {} page(s) on layout '{}' ({} qubits)",
            pages.len(),
            layout.topology,
            layout.width
        );
        pages.iter().map(|p| self.run_page(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn backend() -> IdealBackend<StdRng> {
        IdealBackend::new(StdRng::seed_from_u64(11))
    }

    fn page(width: usize, gates: &[Gate]) -> CircuitPage {
        let mut p = CircuitPage::new(0, width);
        for &g in gates {
            p.push(g);
        }
        p.mark_run();
        p.seal();
        p
    }

    #[test]
    fn test_routed_one_arrives() {
        let p = page(4, &[Gate::X(0), Gate::Swap(0, 1), Gate::Swap(1, 2)]);
        let o = backend().run_page(&p).unwrap();
        assert_eq!(o.to_string(), "0100");
        assert_eq!(o.bit(2), Some(1));
    }

    #[test]
    fn test_x_basis_roundtrip_is_deterministic() {
        // |−⟩ routed and measured in X returns 1 every time.
        let mut b = backend();
        for _ in 0..20 {
            let p = page(3, &[Gate::X(0), Gate::H(0), Gate::Swap(0, 1), Gate::H(1)]);
            assert_eq!(b.run_page(&p).unwrap().bit(1), Some(1));
        }
    }

    #[test]
    fn test_bell_pair_correlated_in_matching_bases() {
        let mut b = backend();
        for rotate in [false, true] {
            for _ in 0..20 {
                let mut gates = vec![Gate::H(0), Gate::Cx(0, 1)];
                if rotate {
                    gates.push(Gate::H(0));
                }
                gates.push(Gate::Swap(1, 2));
                gates.push(Gate::Swap(2, 3));
                if rotate {
                    gates.push(Gate::H(3));
                }
                let o = b.run_page(&page(4, &gates)).unwrap();
                assert_eq!(o.bit(0), o.bit(3));
                assert_eq!(o.bit(1), Some(0));
            }
        }
    }

    #[test]
    fn test_bell_pair_mismatched_bases_decorrelate() {
        let mut b = backend();
        let mut disagreements = 0;
        for _ in 0..200 {
            let gates = [Gate::H(0), Gate::Cx(0, 1), Gate::H(0), Gate::Swap(1, 2)];
            let o = b.run_page(&page(3, &gates)).unwrap();
            if o.bit(0) != o.bit(2) {
                disagreements += 1;
            }
        }
        assert!(disagreements > 60 && disagreements < 140);
    }

    #[test]
    fn test_x_on_bell_half_is_rejected() {
        let p = page(2, &[Gate::H(0), Gate::Cx(0, 1), Gate::X(1)]);
        assert!(matches!(backend().run_page(&p), Err(QkdError::Backend(_))));
    }

    #[test]
    fn test_out_of_range_gate_is_rejected() {
        let p = page(2, &[Gate::Swap(1, 2)]);
        assert!(backend().run_page(&p).is_err());
    }

    #[test]
    fn test_full_flip_probability_inverts_routed_bit() {
        let mut b = backend().with_swap_flip_probability(1.0);
        // Two swaps flip twice, three swaps flip three times.
        let even = page(3, &[Gate::X(0), Gate::Swap(0, 1), Gate::Swap(1, 2)]);
        assert_eq!(b.run_page(&even).unwrap().bit(2), Some(1));
        let odd = page(4, &[Gate::X(0), Gate::Swap(0, 1), Gate::Swap(1, 2), Gate::Swap(2, 3)]);
        assert_eq!(b.run_page(&odd).unwrap().bit(3), Some(0));
    }

    #[test]
    fn test_swap_noise_reaches_routed_zero() {
        let mut b = backend().with_swap_flip_probability(1.0);
        let odd = page(4, &[Gate::Swap(0, 1), Gate::Swap(1, 2), Gate::Swap(2, 3)]);
        assert_eq!(b.run_page(&odd).unwrap().bit(3), Some(1));
        let plus = page(3, &[Gate::H(0), Gate::Swap(0, 1), Gate::H(1)]);
        assert_eq!(b.run_page(&plus).unwrap().bit(1), Some(1));
    }

    #[test]
    fn test_remote_mode_refused() {
        let chain = crate::chain::Chain::linear(2).unwrap();
        let layout = Layout::for_protocol(&chain, crate::protocol::Protocol::Bb84);
        let res = backend().execute(&[page(2, &[])], &layout, ExecutionMode::Remote);
        assert!(matches!(res, Err(QkdError::Backend(_))));
    }
}
