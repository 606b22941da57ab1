//! CLI for qkdchain: QKD protocol experiments routed along a qubit chain.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qkdchain")]
#[command(about = "qkdchain — generate, simulate and analyze chain-routed QKD experiments")]
#[command(version = qkdchain_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the curated qubit chain of a topology and its capacity
    Chain {
        /// Topology identifier
        #[arg(long, default_value = "ibm_sherbrooke")]
        topology: String,

        /// Also list the physical qubit of every chain position
        #[arg(long)]
        qubits: bool,
    },

    /// Generate run records and circuit pages into a new experiment directory.
    /// Execute the pages elsewhere and feed the results to `analyze`.
    Generate {
        #[command(flatten)]
        experiment: commands::ExperimentArgs,

        /// Directory under which the experiment directory is created
        #[arg(long, default_value = "experiments")]
        output: String,
    },

    /// Generate, execute on the noiseless reference backend, reconcile and
    /// analyze in one pass
    Simulate {
        #[command(flatten)]
        experiment: commands::ExperimentArgs,

        /// Probability of a readout flip on the routed qubit per SWAP
        #[arg(long, default_value = "0.0")]
        flip_probability: f64,

        /// Persist the experiment under this directory
        #[arg(long)]
        output: Option<String>,

        /// Print statistics as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Reconcile recorded outcomes of an experiment directory and compute
    /// statistics per routing length
    Analyze {
        /// Experiment directory written by `generate`
        dir: String,

        /// Outcomes file (bitstrings or counts maps). Defaults to
        /// results_local.json or results_device.json by execution mode.
        #[arg(long)]
        outcomes: Option<String>,

        /// Print statistics as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chain { topology, qubits } => commands::chain::run(&topology, qubits),
        Commands::Generate { experiment, output } => {
            commands::generate::run(&experiment, &output);
        }
        Commands::Simulate {
            experiment,
            flip_probability,
            output,
            json,
        } => commands::simulate::run(commands::simulate::SimulateCommandConfig {
            experiment: &experiment,
            flip_probability,
            output: output.as_deref(),
            json,
        }),
        Commands::Analyze {
            dir,
            outcomes,
            json,
        } => commands::analyze::run(&dir, outcomes.as_deref(), json),
    }
}
