//! End-to-end pipeline: generate, execute, reconcile, analyze.

use log::info;
use rand::Rng;

use crate::analysis::{self, LengthStatistics};
use crate::backend::{self, Backend, ExecutionMode, Layout, Outcome};
use crate::chain::Chain;
use crate::error::Result;
use crate::protocol::Protocol;
use crate::reconcile::reconcile;
use crate::trace::{Trace, TraceGenerator};

/// Everything one pipeline pass produced.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// Records are reconciled.
    pub trace: Trace,
    pub layout: Layout,
    pub outcomes: Vec<Outcome>,
    pub statistics: Vec<LengthStatistics>,
}

/// Generate a trace and its submission layout.
pub fn prepare<R: Rng + ?Sized>(
    chain: &Chain,
    protocol: Protocol,
    lengths: &[usize],
    runs: usize,
    rng: &mut R,
) -> Result<(Trace, Layout)> {
    let trace = TraceGenerator::new(chain, protocol).generate(lengths, runs, rng)?;
    let layout = Layout::for_protocol(chain, protocol);
    Ok((trace, layout))
}

/// Reconcile a trace against outcomes and compute its statistics.
///
/// Nothing is returned unless every stage succeeds.
pub fn finish(trace: &mut Trace, outcomes: &[Outcome]) -> Result<Vec<LengthStatistics>> {
    reconcile(&mut trace.records, outcomes)?;
    let statistics = analysis::analyze(&trace.records)?;
    info!("computed statistics for {} length(s)", statistics.len());
    Ok(statistics)
}

/// Run the whole pipeline against `backend`.
pub fn run_experiment<R: Rng + ?Sized>(
    chain: &Chain,
    protocol: Protocol,
    lengths: &[usize],
    runs: usize,
    backend: &mut dyn Backend,
    mode: ExecutionMode,
    rng: &mut R,
) -> Result<ExperimentReport> {
    let (mut trace, layout) = prepare(chain, protocol, lengths, runs, rng)?;
    let outcomes = backend::run_backend(backend, &trace.pages, &layout, mode)?;
    let statistics = finish(&mut trace, &outcomes)?;
    Ok(ExperimentReport {
        trace,
        layout,
        outcomes,
        statistics,
    })
}
