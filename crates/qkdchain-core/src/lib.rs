//! # qkdchain-core
//!
//! **QKD protocol experiments routed along a fixed qubit chain.**
//!
//! `qkdchain-core` generates randomized BB84, BBM92 and Id-BB84 trials,
//! packs them onto circuit pages along a curated chain of physical qubits,
//! hands the pages to an execution backend, maps the returned bitstrings back
//! onto every trial and reports QBER, CHSH and separability estimators per
//! routing distance.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qkdchain_core::{Chain, ExecutionMode, IdealBackend, Protocol, run_experiment};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let chain = Chain::for_topology("ibm_sherbrooke").unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//! let mut backend = IdealBackend::new(StdRng::seed_from_u64(8));
//! let report = run_experiment(
//!     &chain,
//!     Protocol::Bb84,
//!     &[1, 4, 16],
//!     500,
//!     &mut backend,
//!     ExecutionMode::Local,
//!     &mut rng,
//! )
//! .unwrap();
//! for row in &report.statistics {
//!     println!("length {}: QBER {:?}", row.length, row.qber);
//! }
//! ```
//!
//! ## Architecture
//!
//! Trace generator → backend → reconciliation → statistics → experiment files
//!
//! Generation and analysis only meet through [`RunRecord`]s and the
//! [`Outcome`] of each [`CircuitPage`], so the two halves can run in separate
//! processes with an [`ExperimentDir`] in between.

pub mod analysis;
pub mod backend;
pub mod chain;
pub mod circuit;
pub mod config;
pub mod error;
pub mod experiment;
pub mod protocol;
pub mod reconcile;
pub mod record;
pub mod session;
pub mod trace;

pub use analysis::{LengthStatistics, PairCorrelation, Proportion, SeparabilityMetrics, analyze};
pub use backend::{
    Backend, ExecutionMode, IdealBackend, Layout, Outcome, ReplayBackend, run_backend,
};
pub use chain::{Chain, ChainAllocator};
pub use circuit::{CircuitPage, Gate};
pub use config::ExperimentConfig;
pub use error::{ErrorKind, QkdError, Result};
pub use experiment::{ExperimentReport, run_experiment};
pub use protocol::{Basis, Protocol};
pub use reconcile::reconcile;
pub use record::RunRecord;
pub use session::{ExperimentDir, ExperimentMeta};
pub use trace::{Trace, TraceGenerator};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
