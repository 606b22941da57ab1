//! `qkdchain simulate`: full pipeline on the noiseless reference backend.

use std::path::Path;

use log::info;
use qkdchain_core::experiment::{finish, prepare};
use qkdchain_core::{
    Backend, ExperimentConfig, ExperimentDir, ExperimentReport, IdealBackend, run_backend,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ExperimentArgs;

pub struct SimulateCommandConfig<'a> {
    pub experiment: &'a ExperimentArgs,
    pub flip_probability: f64,
    pub output: Option<&'a str>,
    pub json: bool,
}

pub fn run(cfg: SimulateCommandConfig<'_>) {
    let (config, report, exp) = simulate(&cfg).unwrap_or_else(|e| super::fail(e));

    if !cfg.json {
        println!(
            "{} on {}: {} runs on {} circuit(s)\n",
            config.protocol,
            config.topology,
            report.trace.records.len(),
            report.trace.page_count()
        );
    }
    super::print_statistics(&report.statistics, cfg.json);
    if let Some(exp) = exp.as_ref().filter(|_| !cfg.json) {
        println!("\nWritten to {}", exp.dir().display());
    }
}

/// Run every stage, then write the experiment directory. A failing stage
/// leaves the output directory untouched.
fn simulate(
    cfg: &SimulateCommandConfig<'_>,
) -> qkdchain_core::Result<(ExperimentConfig, ExperimentReport, Option<ExperimentDir>)> {
    let config = super::load_config(cfg.experiment)?;
    let chain = config.chain()?;
    let mut rng = super::make_rng(&config);

    let (mut trace, layout) = prepare(
        &chain,
        config.protocol,
        &config.lengths,
        config.runs,
        &mut rng,
    )?;

    let mut backend = IdealBackend::new(StdRng::seed_from_u64(rng.random()))
        .with_swap_flip_probability(cfg.flip_probability);
    let outcomes = run_backend(&mut backend, &trace.pages, &layout, config.mode)?;
    let statistics = finish(&mut trace, &outcomes)?;

    let report = ExperimentReport {
        trace,
        layout,
        outcomes,
        statistics,
    };
    let exp = match cfg.output {
        Some(dir) => {
            let exp =
                ExperimentDir::save_report(Path::new(dir), &config, backend.name(), &report)?;
            info!("simulation saved to {}", exp.dir().display());
            Some(exp)
        }
        None => None,
    };
    Ok((config, report, exp))
}
