pub mod analyze;
pub mod chain;
pub mod generate;
pub mod simulate;

use std::fmt::Display;
use std::path::Path;

use clap::Args;
use qkdchain_core::{ExecutionMode, ExperimentConfig, LengthStatistics, Protocol};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Experiment parameters shared by `generate` and `simulate`. Flags override
/// the config file, which overrides the defaults.
#[derive(Args, Debug, Default)]
pub struct ExperimentArgs {
    /// JSON experiment config
    #[arg(long)]
    pub config: Option<String>,

    /// Protocol: BB84, BBM92 or Id-BB84
    #[arg(long)]
    pub protocol: Option<String>,

    /// Topology identifier
    #[arg(long)]
    pub topology: Option<String>,

    /// Comma-separated routing lengths, e.g. 1,2,4,8
    #[arg(long, value_delimiter = ',')]
    pub lengths: Option<Vec<usize>>,

    /// Runs per routing length
    #[arg(long)]
    pub runs: Option<usize>,

    /// Execution mode: local or remote
    #[arg(long)]
    pub mode: Option<String>,

    /// Also write a readable gate listing of every circuit
    #[arg(long)]
    pub draw: bool,

    /// Seed for reproducible generation
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Resolve the effective config. A missing seed is drawn here so that it can
/// be recorded with the experiment.
pub fn load_config(args: &ExperimentArgs) -> qkdchain_core::Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_path(Path::new(path))?,
        None => ExperimentConfig::default(),
    };
    if let Some(p) = &args.protocol {
        config.protocol = p.parse::<Protocol>()?;
    }
    if let Some(t) = &args.topology {
        config.topology = t.clone();
    }
    if let Some(lengths) = &args.lengths {
        config.lengths = lengths.clone();
    }
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(m) = &args.mode {
        config.mode = m.parse::<ExecutionMode>()?;
    }
    if args.draw {
        config.draw = true;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if config.seed.is_none() {
        config.seed = Some(rand::random());
    }
    config.validate()?;
    Ok(config)
}

/// Generator RNG for a resolved config.
pub fn make_rng(config: &ExperimentConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Print an error and exit with status 1.
pub fn fail(e: impl Display) -> ! {
    eprintln!("Error: {e}");
    std::process::exit(1);
}

fn fmt_opt(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(x) => format!("{x:.precision$}"),
        None => "—".to_string(),
    }
}

/// Print statistics as a table, or as JSON.
pub fn print_statistics(statistics: &[LengthStatistics], json: bool) {
    if json {
        match serde_json::to_string_pretty(statistics) {
            Ok(s) => println!("{s}"),
            Err(e) => fail(e),
        }
        return;
    }

    println!(
        "{:>6} {:>7} {:>7} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "length", "runs", "sifted", "QBER", "±", "CHSH", "±", "‖Δ‖", "surface"
    );
    println!("{}", "─".repeat(80));
    for row in statistics {
        let sep = row.separability;
        println!(
            "{:>6} {:>7} {:>7} {:>8} {:>8} {:>8.4} {:>8.4} {:>8} {:>8}",
            row.length,
            row.runs,
            row.sifted,
            fmt_opt(row.qber, 4),
            fmt_opt(row.qber_error, 4),
            row.chsh,
            row.chsh_error,
            fmt_opt(sep.map(|m| m.norm_expected_minus_observed), 4),
            fmt_opt(sep.map(|m| m.distance_to_uncorrelated_surface), 3),
        );
    }
}
