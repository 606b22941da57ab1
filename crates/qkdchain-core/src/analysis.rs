//! Grouped protocol statistics per routing distance.
//!
//! Records are folded into per-length count accumulators (no raw runs are
//! kept) from which three families of estimators are derived:
//! QBER with its Wald error, the CHSH correlation value with propagated
//! error, and separability distances over eight measured fractions.
//! Rows come out sorted by ascending length.

use std::collections::BTreeMap;
use std::f64::consts::SQRT_2;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::error::{QkdError, Result};
use crate::protocol::Basis;
use crate::record::RunRecord;

/// Basis pairs as `(alice, bob)`, in CHSH table order.
pub const BASIS_PAIRS: [(Basis, Basis); 4] = [
    (Basis::X, Basis::X),
    (Basis::X, Basis::Z),
    (Basis::Z, Basis::X),
    (Basis::Z, Basis::Z),
];

/// Sign of each basis-pair expectation in `S = E_XX − E_XZ + E_ZX + E_ZZ`.
const CHSH_SIGNS: [f64; 4] = [1.0, -1.0, 1.0, 1.0];

/// Names of the eight separability fractions, in vector order.
pub const FRACTION_LABELS: [&str; 8] = [
    "alice_x_one",
    "alice_z_one",
    "bob_x_one",
    "bob_z_one",
    "both_one_xx",
    "both_one_xz",
    "both_one_zx",
    "both_one_zz",
];

/// Fractions of noiseless BB84 statistics: uniform marginals, perfectly
/// correlated matched bases and independent mismatched bases.
pub const EXPECTED_FRACTIONS: [f64; 8] = [0.5, 0.5, 0.5, 0.5, 0.5, 0.25, 0.25, 0.5];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A binomial proportion with its Wald (normal approximation) error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proportion {
    pub value: f64,
    pub error: f64,
    pub n: u64,
}

impl Proportion {
    /// `successes / n` with error `sqrt(p(1−p)/n)`; `None` when `n = 0`.
    pub fn wald(successes: u64, n: u64) -> Option<Self> {
        if n == 0 {
            return None;
        }
        let value = successes as f64 / n as f64;
        Some(Self {
            value,
            error: (value * (1.0 - value) / n as f64).sqrt(),
            n,
        })
    }
}

/// Expectation value of one basis pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    /// Two-letter basis pair, Alice first (`"XZ"`).
    pub pair: String,
    pub n: u64,
    /// `(agree − disagree) / n`, or 0 for an empty pair.
    pub expectation: f64,
    /// `(1 − E²) / n`, or 0 for an empty pair.
    pub variance: f64,
}

/// Distances of the observed fraction vector from ideal and from
/// uncorrelated statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeparabilityMetrics {
    /// Euclidean norm of observed minus expected fractions.
    pub norm_expected_minus_observed: f64,
    /// Same norm with every component divided by its own error. Missing when
    /// any error is zero.
    pub norm_error_normalized: Option<f64>,
    /// Distance to the product-of-marginals surface, in units of the
    /// expected point's distance to that surface.
    pub distance_to_uncorrelated_surface: f64,
    /// Standard normal CDF of the unnormalized norm over the quadrature sum
    /// of errors. Missing when every error is zero.
    pub gaussian_overlap: Option<f64>,
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthStatistics {
    pub length: usize,
    pub runs: u64,
    /// Basis-matched runs.
    pub sifted: u64,
    pub qber: Option<f64>,
    pub qber_error: Option<f64>,
    pub chsh: f64,
    pub chsh_error: f64,
    pub correlations: Vec<PairCorrelation>,
    /// The eight fractions of [`FRACTION_LABELS`]; `None` when their subset is empty.
    pub fractions: Vec<Option<Proportion>>,
    pub separability: Option<SeparabilityMetrics>,
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Counts for one basis pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairTally {
    pub total: u64,
    pub agree: u64,
    pub alice_ones: u64,
    pub bob_ones: u64,
    pub both_ones: u64,
}

/// Per-length counts, indexed `[alice_basis][bob_basis]`.
#[derive(Debug, Clone, Default)]
pub struct LengthAccumulator {
    pairs: [[PairTally; 2]; 2],
}

impl LengthAccumulator {
    /// Fold in one run with both bits measured.
    pub fn add(&mut self, alice_basis: Basis, bob_basis: Basis, alice_bit: u8, bob_bit: u8) {
        let t = &mut self.pairs[alice_basis.index()][bob_basis.index()];
        t.total += 1;
        t.agree += u64::from(alice_bit == bob_bit);
        t.alice_ones += u64::from(alice_bit == 1);
        t.bob_ones += u64::from(bob_bit == 1);
        t.both_ones += u64::from(alice_bit == 1 && bob_bit == 1);
    }

    pub fn tally(&self, alice: Basis, bob: Basis) -> PairTally {
        self.pairs[alice.index()][bob.index()]
    }

    pub fn runs(&self) -> u64 {
        self.pairs.iter().flatten().map(|t| t.total).sum()
    }

    /// `(total, agreements)` over basis-matched runs.
    pub fn sifted(&self) -> (u64, u64) {
        let xx = self.tally(Basis::X, Basis::X);
        let zz = self.tally(Basis::Z, Basis::Z);
        (xx.total + zz.total, xx.agree + zz.agree)
    }

    /// QBER and its Wald error.
    pub fn qber(&self) -> Option<Proportion> {
        let (n, agree) = self.sifted();
        Proportion::wald(n - agree, n)
    }

    pub fn correlations(&self) -> Vec<PairCorrelation> {
        BASIS_PAIRS
            .iter()
            .map(|&(a, b)| {
                let t = self.tally(a, b);
                let (expectation, variance) = if t.total == 0 {
                    (0.0, 0.0)
                } else {
                    let n = t.total as f64;
                    let e = (2.0 * t.agree as f64 - n) / n;
                    (e, (1.0 - e * e) / n)
                };
                PairCorrelation {
                    pair: format!("{a}{b}"),
                    n: t.total,
                    expectation,
                    variance,
                }
            })
            .collect()
    }

    /// `(S, σ_S)` with empty pairs contributing zero.
    pub fn chsh(&self) -> (f64, f64) {
        let correlations = self.correlations();
        let s: f64 = correlations
            .iter()
            .zip(CHSH_SIGNS)
            .map(|(c, sign)| sign * c.expectation)
            .sum();
        let var: f64 = correlations.iter().map(|c| c.variance).sum();
        (s, var.sqrt())
    }

    /// The eight fractions in [`FRACTION_LABELS`] order.
    pub fn fractions(&self) -> [Option<Proportion>; 8] {
        let party = |basis: Basis, alice: bool| {
            let (ones, n) = Basis::ALL.iter().fold((0, 0), |(ones, n), &other| {
                let t = if alice {
                    self.tally(basis, other)
                } else {
                    self.tally(other, basis)
                };
                let o = if alice { t.alice_ones } else { t.bob_ones };
                (ones + o, n + t.total)
            });
            Proportion::wald(ones, n)
        };
        let joint = |a: Basis, b: Basis| {
            let t = self.tally(a, b);
            Proportion::wald(t.both_ones, t.total)
        };
        [
            party(Basis::X, true),
            party(Basis::Z, true),
            party(Basis::X, false),
            party(Basis::Z, false),
            joint(Basis::X, Basis::X),
            joint(Basis::X, Basis::Z),
            joint(Basis::Z, Basis::X),
            joint(Basis::Z, Basis::Z),
        ]
    }
}

// ---------------------------------------------------------------------------
// Analysis functions
// ---------------------------------------------------------------------------

/// Group reconciled records by length and compute every estimator.
pub fn analyze(records: &[RunRecord]) -> Result<Vec<LengthStatistics>> {
    let pending = records.iter().filter(|r| !r.is_reconciled()).count();
    if pending > 0 {
        return Err(QkdError::Unreconciled { count: pending });
    }

    let mut groups: BTreeMap<usize, LengthAccumulator> = BTreeMap::new();
    for r in records {
        if let (Some(a), Some(b)) = (r.alice_bit, r.bob_bit) {
            groups
                .entry(r.length)
                .or_default()
                .add(r.alice_basis, r.bob_basis, a, b);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(length, acc)| summarize(length, &acc))
        .collect())
}

/// Estimators for one length group.
pub fn summarize(length: usize, acc: &LengthAccumulator) -> LengthStatistics {
    let (sifted, _) = acc.sifted();
    let qber = acc.qber();
    if qber.is_none() {
        warn!("length {length}: no basis-matched runs, QBER undefined");
    }
    let (chsh, chsh_error) = acc.chsh();
    let fractions = acc.fractions();
    let metrics = separability(&fractions);
    if metrics.is_none() {
        debug!("length {length}: separability metrics undefined (empty basis subset)");
    }

    LengthStatistics {
        length,
        runs: acc.runs(),
        sifted,
        qber: qber.map(|p| p.value),
        qber_error: qber.map(|p| p.error),
        chsh,
        chsh_error,
        correlations: acc.correlations(),
        fractions: fractions.to_vec(),
        separability: metrics,
    }
}

/// Separability distances of observed fractions; `None` if any fraction is
/// undefined.
pub fn separability(fractions: &[Option<Proportion>; 8]) -> Option<SeparabilityMetrics> {
    let mut values = [0.0; 8];
    let mut errors = [0.0; 8];
    for (i, f) in fractions.iter().enumerate() {
        let p = (*f)?;
        values[i] = p.value;
        errors[i] = p.error;
    }

    let diffs: Vec<f64> = values
        .iter()
        .zip(EXPECTED_FRACTIONS)
        .map(|(v, e)| v - e)
        .collect();
    let norm = diffs.iter().map(|d| d * d).sum::<f64>().sqrt();

    let norm_error_normalized = if errors.iter().all(|&s| s > 0.0) {
        Some(
            diffs
                .iter()
                .zip(errors)
                .map(|(d, s)| (d / s).powi(2))
                .sum::<f64>()
                .sqrt(),
        )
    } else {
        None
    };

    let reference = distance_to_uncorrelated(&EXPECTED_FRACTIONS);
    let distance_to_uncorrelated_surface = distance_to_uncorrelated(&values) / reference;

    let spread = errors.iter().map(|s| s * s).sum::<f64>().sqrt();
    let gaussian_overlap = (spread > 0.0).then(|| standard_normal_cdf(norm / spread));

    Some(SeparabilityMetrics {
        norm_expected_minus_observed: norm,
        norm_error_normalized,
        distance_to_uncorrelated_surface,
        gaussian_overlap,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Distance from a fraction vector to the point with the same marginals and
/// joints replaced by products of marginals.
fn distance_to_uncorrelated(f: &[f64; 8]) -> f64 {
    let (alice, bob) = ([f[0], f[1]], [f[2], f[3]]);
    BASIS_PAIRS
        .iter()
        .enumerate()
        .map(|(i, &(a, b))| {
            let d = f[4 + i] - alice[a.index()] * bob[b.index()];
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn rec(length: usize, a: Basis, b: Basis, alice: u8, bob: u8) -> RunRecord {
        RunRecord {
            length,
            alice_basis: a,
            bob_basis: b,
            alice_bit: Some(alice),
            bob_bit: Some(bob),
            virtual_qubit: length,
            classical_bit_index: 0,
            circuit_index: 0,
        }
    }

    /// `n` runs per basis pair where the agreement rate of each pair is given.
    fn synthetic(length: usize, n: usize, agree_rate: [f64; 4], seed: u64) -> Vec<RunRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::new();
        for (i, &(a, b)) in BASIS_PAIRS.iter().enumerate() {
            for _ in 0..n {
                let alice = rng.random_range(0..=1u8);
                let bob = if rng.random_bool(agree_rate[i]) {
                    alice
                } else {
                    1 - alice
                };
                out.push(rec(length, a, b, alice, bob));
            }
        }
        out
    }

    #[test]
    fn test_wald_proportion() {
        let p = Proportion::wald(25, 100).unwrap();
        assert!((p.value - 0.25).abs() < 1e-12);
        assert!((p.error - (0.25f64 * 0.75 / 100.0).sqrt()).abs() < 1e-12);
        assert!(Proportion::wald(0, 0).is_none());
    }

    #[test]
    fn test_qber_recovers_mismatch_rate() {
        let r = 0.1;
        let records = synthetic(4, 20_000, [1.0 - r, 0.5, 0.5, 1.0 - r], 42);
        let stats = analyze(&records).unwrap();
        let row = &stats[0];
        let qber = row.qber.unwrap();
        let err = row.qber_error.unwrap();
        assert_eq!(row.sifted, 40_000);
        assert!((qber - r).abs() < 4.0 * err, "qber {qber} ± {err}");
    }

    #[test]
    fn test_qber_exact_small_sample() {
        let records = vec![
            rec(1, Basis::Z, Basis::Z, 0, 0),
            rec(1, Basis::Z, Basis::Z, 1, 0),
            rec(1, Basis::X, Basis::X, 1, 1),
            rec(1, Basis::X, Basis::X, 0, 0),
            rec(1, Basis::X, Basis::Z, 0, 1),
        ];
        let row = &analyze(&records).unwrap()[0];
        assert_eq!(row.runs, 5);
        assert_eq!(row.sifted, 4);
        assert!((row.qber.unwrap() - 0.25).abs() < 1e-12);
        assert!((row.qber_error.unwrap() - (0.25f64 * 0.75 / 4.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_qber_missing_without_matched_bases() {
        let records = vec![
            rec(2, Basis::X, Basis::Z, 0, 1),
            rec(2, Basis::Z, Basis::X, 1, 1),
        ];
        let row = &analyze(&records).unwrap()[0];
        assert_eq!(row.qber, None);
        assert_eq!(row.qber_error, None);
    }

    #[test]
    fn test_chsh_maximal_synthetic_input() {
        let records = synthetic(3, 50, [1.0, 0.0, 1.0, 1.0], 1);
        let row = &analyze(&records).unwrap()[0];
        assert!((row.chsh - 4.0).abs() < 1e-12);
        // Every |E| = 1 so every variance term vanishes.
        assert!(row.chsh_error.abs() < 1e-12);
        let xz = &row.correlations[1];
        assert_eq!(xz.pair, "XZ");
        assert!((xz.expectation + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_chsh_empty_pair_contributes_zero() {
        let records = vec![
            rec(1, Basis::X, Basis::X, 1, 1),
            rec(1, Basis::X, Basis::X, 0, 0),
            rec(1, Basis::Z, Basis::Z, 0, 1),
        ];
        let row = &analyze(&records).unwrap()[0];
        // E_XX = 1, E_ZZ = -1, XZ and ZX empty.
        assert!(row.chsh.abs() < 1e-12);
        assert_eq!(row.correlations[1].n, 0);
        assert_eq!(row.correlations[1].variance, 0.0);
        assert!(row.chsh_error.abs() < 1e-12);
    }

    #[test]
    fn test_chsh_error_propagation() {
        // XX: 3 agree / 1 disagree → E = 0.5, Var = 0.75 / 4.
        let mut records = vec![
            rec(1, Basis::X, Basis::X, 0, 0),
            rec(1, Basis::X, Basis::X, 1, 1),
            rec(1, Basis::X, Basis::X, 1, 1),
            rec(1, Basis::X, Basis::X, 1, 0),
        ];
        // ZZ: 1 agree / 1 disagree → E = 0, Var = 1 / 2.
        records.push(rec(1, Basis::Z, Basis::Z, 0, 0));
        records.push(rec(1, Basis::Z, Basis::Z, 0, 1));
        let row = &analyze(&records).unwrap()[0];
        assert!((row.chsh - 0.5).abs() < 1e-12);
        let expected = (0.75f64 / 4.0 + 0.5).sqrt();
        assert!((row.chsh_error - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rows_sorted_by_length() {
        let records = vec![
            rec(9, Basis::Z, Basis::Z, 0, 0),
            rec(2, Basis::Z, Basis::Z, 0, 0),
            rec(5, Basis::Z, Basis::Z, 0, 0),
            rec(2, Basis::X, Basis::X, 1, 1),
        ];
        let lengths: Vec<usize> = analyze(&records).unwrap().iter().map(|r| r.length).collect();
        assert_eq!(lengths, vec![2, 5, 9]);
    }

    #[test]
    fn test_unreconciled_records_rejected() {
        let mut r = rec(1, Basis::Z, Basis::Z, 0, 0);
        r.bob_bit = None;
        assert!(matches!(
            analyze(&[r]),
            Err(QkdError::Unreconciled { count: 1 })
        ));
    }

    #[test]
    fn test_fractions_from_counts() {
        let mut acc = LengthAccumulator::default();
        acc.add(Basis::X, Basis::X, 1, 1);
        acc.add(Basis::X, Basis::Z, 1, 0);
        acc.add(Basis::Z, Basis::X, 0, 1);
        acc.add(Basis::Z, Basis::Z, 0, 0);
        let f = acc.fractions();
        // Alice in X: both runs are 1. Bob in X: both runs are 1.
        assert_eq!(f[0].unwrap().value, 1.0);
        assert_eq!(f[0].unwrap().n, 2);
        assert_eq!(f[1].unwrap().value, 0.0);
        assert_eq!(f[2].unwrap().value, 1.0);
        assert_eq!(f[3].unwrap().value, 0.0);
        assert_eq!(f[4].unwrap().value, 1.0);
        assert_eq!(f[5].unwrap().value, 0.0);
        assert_eq!(f[6].unwrap().value, 0.0);
        assert_eq!(f[7].unwrap().value, 0.0);
    }

    #[test]
    fn test_separability_at_expected_point() {
        let fractions = EXPECTED_FRACTIONS.map(|v| {
            Some(Proportion {
                value: v,
                error: 0.01,
                n: 100,
            })
        });
        let m = separability(&fractions).unwrap();
        assert!(m.norm_expected_minus_observed.abs() < 1e-12);
        assert!(m.norm_error_normalized.unwrap().abs() < 1e-12);
        assert!((m.distance_to_uncorrelated_surface - 1.0).abs() < 1e-12);
        assert!((m.gaussian_overlap.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_separability_of_uncorrelated_point() {
        // Independent uniform bits: every joint equals the product of marginals.
        let values = [0.5, 0.5, 0.5, 0.5, 0.25, 0.25, 0.25, 0.25];
        let fractions = values.map(|v| {
            Some(Proportion {
                value: v,
                error: 0.05,
                n: 100,
            })
        });
        let m = separability(&fractions).unwrap();
        assert!(m.distance_to_uncorrelated_surface.abs() < 1e-12);
        let norm = (2.0f64 * 0.25 * 0.25).sqrt();
        assert!((m.norm_expected_minus_observed - norm).abs() < 1e-12);
        assert!((m.norm_error_normalized.unwrap() - norm / 0.05).abs() < 1e-9);
        // norm / sqrt(8 · 0.05²) = 0.3536 / 0.1414 = 2.5 → Φ(2.5)
        assert!((m.gaussian_overlap.unwrap() - 0.99379).abs() < 1e-4);
    }

    #[test]
    fn test_separability_missing_when_subset_empty() {
        let records = vec![rec(1, Basis::Z, Basis::Z, 0, 0)];
        let row = &analyze(&records).unwrap()[0];
        assert!(row.fractions[0].is_none());
        assert!(row.separability.is_none());
    }

    #[test]
    fn test_zero_error_components_drop_normalized_norm() {
        let records = synthetic(2, 200, [1.0, 0.5, 0.5, 1.0], 9);
        let row = &analyze(&records).unwrap()[0];
        let m = row.separability.unwrap();
        assert!(m.gaussian_overlap.is_some());
        // Random marginals have nonzero spread, so this is defined.
        assert!(m.norm_error_normalized.is_some());

        let mut acc = LengthAccumulator::default();
        for (a, b) in BASIS_PAIRS {
            acc.add(a, b, 0, 0);
        }
        let m = separability(&acc.fractions()).unwrap();
        assert!(m.norm_error_normalized.is_none());
        assert!(m.gaussian_overlap.is_none());
    }

    #[test]
    fn test_standard_normal_cdf() {
        assert!((standard_normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((standard_normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((standard_normal_cdf(-1.96) - 0.025).abs() < 1e-3);
    }
}
