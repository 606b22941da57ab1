//! `qkdchain generate`: write records and circuits for external execution.

use std::path::Path;

use log::info;
use qkdchain_core::ExperimentDir;
use qkdchain_core::experiment::prepare;

use super::ExperimentArgs;

pub fn run(args: &ExperimentArgs, output: &str) {
    let config = super::load_config(args).unwrap_or_else(|e| super::fail(e));
    let chain = config.chain().unwrap_or_else(|e| super::fail(e));
    let mut rng = super::make_rng(&config);

    let (trace, layout) = prepare(
        &chain,
        config.protocol,
        &config.lengths,
        config.runs,
        &mut rng,
    )
    .unwrap_or_else(|e| super::fail(e));

    let exp = ExperimentDir::create(Path::new(output), &config, &trace, &layout)
        .unwrap_or_else(|e| super::fail(e));
    info!(
        "generated experiment {} awaiting outcomes at {}",
        exp.meta().id,
        exp.outcomes_path().display()
    );

    println!("Experiment {}", exp.meta().id);
    println!("  protocol:   {}", config.protocol);
    println!("  topology:   {} ({} qubit register)", config.topology, layout.width);
    println!("  lengths:    {:?} × {} runs", config.lengths, config.runs);
    println!("  records:    {}", trace.records.len());
    println!("  circuits:   {}", trace.page_count());
    if let Some(seed) = config.seed {
        println!("  seed:       {seed}");
    }
    println!();
    println!("Written to {}", exp.dir().display());
    println!(
        "Store outcomes as {} there, then run: qkdchain analyze {}",
        exp.outcomes_path().display(),
        exp.dir().display()
    );
}
