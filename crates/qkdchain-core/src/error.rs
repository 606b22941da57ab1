//! Error types for trace generation, reconciliation and persistence.

use thiserror::Error;

/// Coarse classification of a [`QkdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inputs violate a documented precondition.
    Precondition,
    /// Generated output violates its own invariants.
    Integrity,
    /// The execution backend failed.
    Backend,
    /// Reading or writing experiment files failed.
    Io,
}

/// Errors raised anywhere in the experiment pipeline. All of them are fatal.
#[derive(Debug, Error)]
pub enum QkdError {
    /// A routing distance does not fit on the chain even on an empty page.
    #[error("routing length {length} exceeds chain capacity: max length is {max}")]
    LengthExceedsChain { length: usize, max: usize },

    /// A routing distance of zero was requested.
    #[error("routing length must be positive")]
    ZeroLength,

    /// No routing distances were requested.
    #[error("at least one routing length is required")]
    NoLengths,

    /// Zero repetitions per routing distance.
    #[error("runs per length must be positive")]
    ZeroRuns,

    /// Protocol name not one of BB84, BBM92, Id-BB84.
    #[error("unknown protocol '{0}' (expected BB84, BBM92 or Id-BB84)")]
    UnknownProtocol(String),

    /// Topology identifier not in the registry.
    #[error("unknown topology '{0}'")]
    UnknownTopology(String),

    /// Execution mode name not one of local, remote.
    #[error("unknown execution mode '{0}' (expected local or remote)")]
    UnknownMode(String),

    /// A record's circuit index is too large to address a page.
    #[error("circuit index {0} out of range")]
    CircuitIndexOverflow(usize),

    /// Fewer outcomes than circuit pages referenced by the records.
    #[error("missing outcomes: records reference {expected} circuit(s), got {got}")]
    MissingOutcomes { expected: usize, got: usize },

    /// A qubit position lies outside the outcome bitstring.
    #[error("qubit {position} out of range for circuit {circuit} (outcome width {width})")]
    OutcomeOutOfRange {
        circuit: usize,
        position: usize,
        width: usize,
    },

    /// An outcome could not be parsed as a bitstring.
    #[error("malformed outcome: {0}")]
    MalformedOutcome(String),

    /// Statistics were requested over records still pending measurement.
    #[error("{count} record(s) are not reconciled")]
    Unreconciled { count: usize },

    /// The backend returned a different number of outcomes than pages submitted.
    #[error("backend returned {got} outcome(s) for {expected} circuit(s)")]
    OutcomeCountMismatch { expected: usize, got: usize },

    /// Sealed page count disagrees with the highest circuit index in the records.
    #[error("page count mismatch: {pages} sealed page(s), records expect {expected}")]
    PageCountMismatch { pages: usize, expected: usize },

    /// A sealed page has no records assigned to it.
    #[error("circuit page {0} has no assigned runs")]
    EmptyPage(usize),

    /// A page encodes a different number of runs than records point at it.
    #[error("circuit page {page} encodes {runs} run(s) but {records} record(s) reference it")]
    RunCountMismatch {
        page: usize,
        runs: usize,
        records: usize,
    },

    /// A page sits at a different position than its own index says.
    #[error("circuit page at position {position} is numbered {index}")]
    PageIndexMismatch { position: usize, index: usize },

    /// A page was emitted without its final readout.
    #[error("circuit page {0} was never sealed")]
    UnsealedPage(usize),

    /// The backend failed to execute the circuits.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QkdError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LengthExceedsChain { .. }
            | Self::ZeroLength
            | Self::NoLengths
            | Self::ZeroRuns
            | Self::UnknownProtocol(_)
            | Self::UnknownTopology(_)
            | Self::UnknownMode(_)
            | Self::CircuitIndexOverflow(_)
            | Self::MissingOutcomes { .. }
            | Self::OutcomeOutOfRange { .. }
            | Self::MalformedOutcome(_)
            | Self::Unreconciled { .. }
            | Self::OutcomeCountMismatch { .. } => ErrorKind::Precondition,
            Self::PageCountMismatch { .. }
            | Self::EmptyPage(_)
            | Self::RunCountMismatch { .. }
            | Self::PageIndexMismatch { .. }
            | Self::UnsealedPage(_) => ErrorKind::Integrity,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Io,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, QkdError>;
