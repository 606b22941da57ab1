//! `qkdchain analyze`: reconcile recorded outcomes and compute statistics.

use std::path::Path;

use log::info;
use qkdchain_core::ExperimentDir;
use qkdchain_core::experiment::finish;

pub fn run(dir: &str, outcomes_path: Option<&str>, json: bool) {
    let mut exp = ExperimentDir::open(Path::new(dir)).unwrap_or_else(|e| {
        eprintln!("Not an experiment directory: {dir}");
        super::fail(e)
    });

    let mut trace = exp.load_trace().unwrap_or_else(|e| super::fail(e));
    let outcomes = exp
        .load_outcomes(outcomes_path.map(Path::new))
        .unwrap_or_else(|e| super::fail(e));
    let statistics = finish(&mut trace, &outcomes).unwrap_or_else(|e| super::fail(e));

    if let Err(e) = exp
        .write_records(&trace.records)
        .and_then(|_| exp.write_statistics(&statistics))
    {
        super::fail(e);
    }
    info!(
        "analyzed experiment {} ({} length(s))",
        exp.meta().id,
        statistics.len()
    );

    if !json {
        let meta = exp.meta();
        println!(
            "{} on {}: {} records, {} outcome(s)\n",
            meta.protocol,
            meta.topology,
            trace.records.len(),
            outcomes.len()
        );
    }
    super::print_statistics(&statistics, json);
    if !json {
        println!("\nStatistics written to {}", exp.dir().display());
    }
}
