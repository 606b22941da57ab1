//! Replays outcomes recorded by an external execution.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use super::{Backend, ExecutionMode, Layout, Outcome};
use crate::circuit::CircuitPage;
use crate::error::Result;

/// One entry of a recorded results file: either a bare bitstring or a
/// counts map as returned by a sampler.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordedOutcome {
    Bits(String),
    Counts(BTreeMap<String, u64>),
}

/// Backend that hands back previously recorded outcomes.
#[derive(Debug, Clone)]
pub struct ReplayBackend {
    outcomes: Vec<Outcome>,
}

impl ReplayBackend {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self { outcomes }
    }

    /// Parse a JSON array of bitstrings and/or counts maps.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RecordedOutcome> = serde_json::from_str(json)?;
        let outcomes = raw
            .iter()
            .map(|entry| match entry {
                RecordedOutcome::Bits(bits) => Outcome::parse(bits),
                RecordedOutcome::Counts(counts) => {
                    if counts.len() > 1 {
                        warn!(
                            "multi-shot counts with {} distinct bitstrings; keeping the most frequent",
                            counts.len()
                        );
                    }
                    Outcome::from_counts(counts)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { outcomes })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let backend = Self::from_json(&fs::read_to_string(path)?)?;
        info!(
            "loaded {} recorded outcome(s) from {}",
            backend.outcomes.len(),
            path.display()
        );
        Ok(backend)
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }
}

impl Backend for ReplayBackend {
    fn name(&self) -> &str {
        "replay"
    }

    fn execute(
        &mut self,
        pages: &[CircuitPage],
        _layout: &Layout,
        _mode: ExecutionMode,
    ) -> Result<Vec<Outcome>> {
        for (page, outcome) in pages.iter().zip(&self.outcomes) {
            if outcome.width() != page.width() {
                warn!(
                    "circuit {}: recorded outcome has {} bits, page register has {}",
                    page.index(),
                    outcome.width(),
                    page.width()
                );
            }
        }
        Ok(self.outcomes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_entries() {
        let json = r#"["0101", {"1100": 1}, {"0000": 2, "1111": 7}]"#;
        let backend = ReplayBackend::from_json(json).unwrap();
        let strings: Vec<String> = backend.outcomes().iter().map(|o| o.to_string()).collect();
        assert_eq!(strings, vec!["0101", "1100", "1111"]);
    }

    #[test]
    fn test_malformed_entry_fails() {
        assert!(ReplayBackend::from_json(r#"["01a1"]"#).is_err());
        assert!(ReplayBackend::from_json(r#"{"not": "a list"}"#).is_err());
    }

    #[test]
    fn test_from_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("results_local.json");
        std::fs::write(&path, r#"["10", "01"]"#).unwrap();
        let backend = ReplayBackend::from_path(&path).unwrap();
        assert_eq!(backend.outcomes().len(), 2);
    }
}
