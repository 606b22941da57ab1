//! Experiment directories on disk.
//!
//! Generation, execution and analysis may run in separate processes, so every
//! stage hands its output over through files in one experiment directory.
//!
//! # Storage Format
//!
//! Each experiment is a directory `{timestamp}-{protocol}-{topology}` holding:
//! - `experiment.json`: metadata (id, parameters, page count, timestamps)
//! - `records.json`: run records as 8-tuples, pending bits as `null`
//! - `pages.json`: circuit pages
//! - `circuits.qasm`: the same pages as OpenQASM 2.0
//! - `layout.json`: virtual-to-physical qubit assignment
//! - `circuit.txt`: human-readable gate listing (only when drawing is enabled)
//! - `results_local.json` / `results_device.json`: one bitstring per page
//! - `statistics.json`, `statistics.csv`: per-length estimators

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::info;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::analysis::LengthStatistics;
use crate::backend::{ExecutionMode, Layout, Outcome, ReplayBackend};
use crate::circuit::CircuitPage;
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::experiment::ExperimentReport;
use crate::protocol::Protocol;
use crate::record::RunRecord;
use crate::trace::Trace;

const META_FILE: &str = "experiment.json";
const RECORDS_FILE: &str = "records.json";
const PAGES_FILE: &str = "pages.json";
const QASM_FILE: &str = "circuits.qasm";
const LAYOUT_FILE: &str = "layout.json";
const DRAWING_FILE: &str = "circuit.txt";
const STATISTICS_JSON: &str = "statistics.json";
const STATISTICS_CSV: &str = "statistics.csv";

/// Header of `statistics.csv`.
pub const STATISTICS_CSV_HEADER: &str = "length,runs,sifted,qber,qber_error,chsh,chsh_error,\
e_xx,e_xz,e_zx,e_zz,norm_expected_minus_observed,norm_error_normalized,\
distance_to_uncorrelated_surface,gaussian_overlap";

// ---------------------------------------------------------------------------
// Experiment metadata (experiment.json)
// ---------------------------------------------------------------------------

/// Metadata written when the experiment directory is created and updated as
/// later stages complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub version: u32,
    pub id: String,
    pub created_at: String,
    pub protocol: Protocol,
    pub topology: String,
    pub lengths: Vec<usize>,
    pub runs: usize,
    pub mode: ExecutionMode,
    pub seed: Option<u64>,
    pub page_count: usize,
    pub record_count: usize,
    pub register_width: usize,
    /// Backend that produced the stored outcomes.
    pub backend: Option<String>,
    pub executed_at: Option<String>,
    pub analyzed_at: Option<String>,
    pub qkdchain_version: String,
}

// ---------------------------------------------------------------------------
// Experiment directory
// ---------------------------------------------------------------------------

/// Reads and writes the files of one experiment directory.
#[derive(Debug, Clone)]
pub struct ExperimentDir {
    dir: PathBuf,
    meta: ExperimentMeta,
}

impl ExperimentDir {
    /// Create a new experiment directory under `output_dir` and write the
    /// generated trace into it.
    pub fn create(
        output_dir: &Path,
        config: &ExperimentConfig,
        trace: &Trace,
        layout: &Layout,
    ) -> Result<Self> {
        let created_at = since_epoch(SystemTime::now());
        let dir_name = format!(
            "{}-{}-{}",
            format_iso8601_compact(created_at),
            trace.protocol.name().to_ascii_lowercase(),
            config.topology
        );
        let dir = output_dir.join(dir_name);
        fs::create_dir_all(&dir)?;

        let meta = ExperimentMeta {
            version: 1,
            id: Uuid::new_v4().to_string(),
            created_at: format_iso8601(created_at),
            protocol: trace.protocol,
            topology: config.topology.clone(),
            lengths: config.lengths.clone(),
            runs: config.runs,
            mode: config.mode,
            seed: config.seed,
            page_count: trace.page_count(),
            record_count: trace.records.len(),
            register_width: layout.width,
            backend: None,
            executed_at: None,
            analyzed_at: None,
            qkdchain_version: crate::VERSION.to_string(),
        };

        let experiment = Self { dir, meta };
        experiment.write_records(&trace.records)?;
        write_json(&experiment.dir.join(PAGES_FILE), &trace.pages)?;
        write_json(&experiment.dir.join(LAYOUT_FILE), layout)?;
        experiment.write_qasm(&trace.pages)?;
        if config.draw {
            experiment.write_drawing(&trace.pages)?;
        }
        experiment.write_meta()?;

        info!(
            "wrote experiment {} ({} records, {} pages) to {}",
            experiment.meta.id,
            trace.records.len(),
            trace.page_count(),
            experiment.dir.display()
        );
        Ok(experiment)
    }

    /// Create an experiment directory for a finished pipeline pass: the
    /// reconciled trace, the outcomes of `backend` and the statistics.
    pub fn save_report(
        output_dir: &Path,
        config: &ExperimentConfig,
        backend: &str,
        report: &ExperimentReport,
    ) -> Result<Self> {
        let mut experiment = Self::create(output_dir, config, &report.trace, &report.layout)?;
        experiment.write_outcomes(backend, &report.outcomes)?;
        experiment.write_statistics(&report.statistics)?;
        Ok(experiment)
    }

    /// Open an existing experiment directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let meta = read_json(&dir.join(META_FILE))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            meta,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &ExperimentMeta {
        &self.meta
    }

    /// Default location of recorded outcomes for the experiment's mode.
    pub fn outcomes_path(&self) -> PathBuf {
        self.dir.join(self.meta.mode.results_file_name())
    }

    // -- writers ------------------------------------------------------------

    /// Replace `records.json`, e.g. with reconciled records.
    pub fn write_records(&self, records: &[RunRecord]) -> Result<()> {
        write_json(&self.dir.join(RECORDS_FILE), records)
    }

    /// Store backend outcomes under the mode's results file name.
    pub fn write_outcomes(&mut self, backend: &str, outcomes: &[Outcome]) -> Result<PathBuf> {
        let path = self.outcomes_path();
        write_json(&path, outcomes)?;
        self.meta.backend = Some(backend.to_string());
        self.meta.executed_at = Some(format_iso8601(since_epoch(SystemTime::now())));
        self.write_meta()?;
        Ok(path)
    }

    /// Write `statistics.json` and `statistics.csv`.
    pub fn write_statistics(&mut self, statistics: &[LengthStatistics]) -> Result<()> {
        write_json(&self.dir.join(STATISTICS_JSON), statistics)?;

        let file = File::create(self.dir.join(STATISTICS_CSV))?;
        let mut csv = BufWriter::new(file);
        writeln!(csv, "{STATISTICS_CSV_HEADER}")?;
        for row in statistics {
            writeln!(csv, "{}", statistics_csv_row(row))?;
        }
        csv.flush()?;

        self.meta.analyzed_at = Some(format_iso8601(since_epoch(SystemTime::now())));
        self.write_meta()
    }

    fn write_meta(&self) -> Result<()> {
        write_json(&self.dir.join(META_FILE), &self.meta)
    }

    fn write_qasm(&self, pages: &[CircuitPage]) -> Result<()> {
        let mut out = BufWriter::new(File::create(self.dir.join(QASM_FILE))?);
        for page in pages {
            writeln!(out, "// circuit {}", page.index())?;
            write!(out, "{}", page.to_qasm())?;
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    fn write_drawing(&self, pages: &[CircuitPage]) -> Result<()> {
        let mut out = BufWriter::new(File::create(self.dir.join(DRAWING_FILE))?);
        for page in pages {
            write!(out, "{page}")?;
        }
        out.flush()?;
        Ok(())
    }

    // -- loaders ------------------------------------------------------------

    pub fn load_records(&self) -> Result<Vec<RunRecord>> {
        read_json(&self.dir.join(RECORDS_FILE))
    }

    pub fn load_pages(&self) -> Result<Vec<CircuitPage>> {
        read_json(&self.dir.join(PAGES_FILE))
    }

    pub fn load_layout(&self) -> Result<Layout> {
        read_json(&self.dir.join(LAYOUT_FILE))
    }

    /// Rebuild the trace and check its page invariants.
    pub fn load_trace(&self) -> Result<Trace> {
        let trace = Trace {
            protocol: self.meta.protocol,
            records: self.load_records()?,
            pages: self.load_pages()?,
        };
        trace.verify()?;
        Ok(trace)
    }

    /// Load outcomes from `path`, or from the mode's default results file.
    /// Accepts bitstrings and counts maps.
    pub fn load_outcomes(&self, path: Option<&Path>) -> Result<Vec<Outcome>> {
        let path = path.map_or_else(|| self.outcomes_path(), Path::to_path_buf);
        Ok(ReplayBackend::from_path(&path)?.outcomes().to_vec())
    }

    pub fn load_statistics(&self) -> Result<Vec<LengthStatistics>> {
        read_json(&self.dir.join(STATISTICS_JSON))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// One CSV row; missing values are empty cells.
fn statistics_csv_row(row: &LengthStatistics) -> String {
    let cell = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();
    let mut cells = vec![
        row.length.to_string(),
        row.runs.to_string(),
        row.sifted.to_string(),
        cell(row.qber),
        cell(row.qber_error),
        cell(Some(row.chsh)),
        cell(Some(row.chsh_error)),
    ];
    cells.extend(row.correlations.iter().map(|c| cell(Some(c.expectation))));
    let sep = row.separability;
    cells.push(cell(sep.map(|m| m.norm_expected_minus_observed)));
    cells.push(cell(sep.and_then(|m| m.norm_error_normalized)));
    cells.push(cell(sep.map(|m| m.distance_to_uncorrelated_surface)));
    cells.push(cell(sep.and_then(|m| m.gaussian_overlap)));
    cells.join(",")
}

fn since_epoch(t: SystemTime) -> Duration {
    t.duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Compact UTC timestamp for directory names, e.g. `2026-02-15T013000Z`.
fn format_iso8601_compact(since_epoch: Duration) -> String {
    let (date, h, m, s) = utc_parts(since_epoch);
    format!("{date}T{h:02}{m:02}{s:02}Z")
}

/// UTC timestamp for metadata, e.g. `2026-02-15T01:30:00Z`.
fn format_iso8601(since_epoch: Duration) -> String {
    let (date, h, m, s) = utc_parts(since_epoch);
    format!("{date}T{h:02}:{m:02}:{s:02}Z")
}

/// `YYYY-MM-DD` plus time of day. Days are mapped to the proleptic
/// Gregorian calendar in closed form (400-year eras starting March 1st).
fn utc_parts(since_epoch: Duration) -> (String, u64, u64, u64) {
    let secs = since_epoch.as_secs();
    let (days, time) = (secs / 86_400, secs % 86_400);

    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = era * 400 + yoe + u64::from(month <= 2);

    (
        format!("{year:04}-{month:02}-{day:02}"),
        time / 3_600,
        time / 60 % 60,
        time % 60,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
