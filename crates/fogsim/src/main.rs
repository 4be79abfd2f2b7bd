use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use fogsim::core::scenario::Scenario;
use fogsim::experiment::ExperimentConfig;
use fogsim::simulation::FogSimulation;

/// Discrete-event simulator of VM-placement strategies for a fog computing
/// provider.
#[derive(Debug, clap::Parser)]
#[command(version, long_about = None)]
struct Args {
    /// Path to the input scenario file
    #[arg(long)]
    scenario: PathBuf,
    /// Seed used for random number generation
    #[arg(long, default_value_t = 5489)]
    rng_seed: u64,
    /// Relative tolerance option to set to the optimizer (0 disables)
    #[arg(long, default_value_t = 0.0)]
    optim_reltol: f64,
    /// Time limit option to set to the optimizer, in seconds (<= 0 disables)
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    optim_tilim: f64,
    /// Level for confidence intervals
    #[arg(long, default_value_t = 0.95)]
    sim_ci_level: f64,
    /// Relative precision for the half-width of the confidence intervals
    #[arg(long, default_value_t = 0.04)]
    sim_ci_rel_precision: f64,
    /// Maximum number of replications (0 means 'unlimited')
    #[arg(long, default_value_t = 0)]
    sim_max_num_rep: usize,
    /// Length of each replication, in simulated time
    #[arg(long, default_value_t = 0.0)]
    sim_max_rep_len: f64,
    /// Path to the output stats data file
    #[arg(long)]
    out_stats_file: Option<PathBuf>,
    /// Path to the output trace data file
    #[arg(long)]
    out_trace_file: Option<PathBuf>,
    /// Override of the scenario's real-workload allocation mode, one of
    /// {allocate-all, allocate-with-fixed-fns, allocate-none}
    #[arg(long)]
    real_workload_alloc: Option<String>,
    /// Show the experimental settings without running any experiment
    #[arg(long, default_value_t = false)]
    test: bool,
    /// Verbosity level: 0 for minimum and 9 for maximum verbosity
    #[arg(long, default_value_t = 0)]
    verbosity: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbosity);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fogsim: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let scenario =
        Scenario::from_file(&args.scenario).context("failed to load the scenario file")?;

    let real_workload_allocation = args
        .real_workload_alloc
        .as_deref()
        .map(|s| s.parse())
        .transpose()
        .map_err(anyhow::Error::msg)
        .context("failed to parse --real-workload-alloc")?;

    let config = ExperimentConfig {
        rng_seed: args.rng_seed,
        optim_relative_tolerance: args.optim_reltol,
        optim_time_limit: args.optim_tilim,
        ci_level: args.sim_ci_level,
        ci_rel_precision: args.sim_ci_rel_precision,
        max_num_replications: args.sim_max_num_rep,
        max_replication_duration: args.sim_max_rep_len,
        output_stats_file: args.out_stats_file.clone(),
        output_trace_file: args.out_trace_file.clone(),
        real_workload_allocation,
    };

    if args.test {
        println!("SCENARIO:\n{}", scenario);
        println!(
            "OPTIONS: {}",
            serde_json::to_string_pretty(&config).context("failed to serialize the settings")?
        );
        return Ok(());
    }

    let mut simulation =
        FogSimulation::new(scenario, config).context("failed to set up the simulation")?;
    let replications = simulation
        .run()
        .context("failed to run the simulation experiment")?;

    log::info!("Simulation finished after {} replications", replications);

    Ok(())
}

fn init_logging(verbosity: u8) {
    // An explicit RUST_LOG wins over the verbosity flag.
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = match verbosity {
            0 => LevelFilter::Warn,
            1..=2 => LevelFilter::Info,
            3..=5 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}
