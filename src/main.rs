//! nanopond - CLI Entry Point
//!
//! Runs the pond and prints one CSV row per update interval on stdout.

use clap::{Parser, Subcommand};
use nanopond::{benchmark, Config, StopFlag, UpdateRow, World};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "nanopond")]
#[command(version)]
#[command(about = "Parallel artificial-life pond of self-replicating genomes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "nanopond.yaml")]
        config: PathBuf,

        /// Cell executions to simulate (runs until stopped if omitted)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Random seed, overriding the config
        #[arg(long)]
        seed: Option<u32>,

        /// Worker threads, overriding the config (0 = one per core)
        #[arg(long)]
        threads: Option<usize>,

        /// Output directory for reports and history
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not print update rows
        #[arg(short, long)]
        quiet: bool,

        /// Stop after this many seconds of wall-clock time
        #[arg(long)]
        time_limit: Option<u64>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Cell executions
        #[arg(short, long, default_value = "1000000")]
        ticks: u64,

        #[arg(long, default_value = "128")]
        width: usize,

        #[arg(long, default_value = "96")]
        height: usize,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "nanopond.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            seed,
            threads,
            output,
            quiet,
            time_limit,
        } => {
            let mut config = load_config(&config)?;
            if let Some(threads) = threads {
                config.scheduler.threads = threads;
            }
            if let Some(seed) = seed {
                config.scheduler.seed = seed;
            }
            if let Some(dir) = output {
                config.logging.report_dir = dir.to_string_lossy().into_owned();
            }
            init_logging(&config.logging.log_level);
            run_simulation(config, ticks, quiet, time_limit)
        }

        Commands::Benchmark {
            ticks,
            width,
            height,
        } => {
            init_logging("info");
            let result = benchmark(ticks, width, height)?;
            println!("{}", result);
            Ok(())
        }

        Commands::Init { output } => {
            init_logging("info");
            Config::default().save(&output)?;
            log::info!("Wrote default configuration to {}", output.display());
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        Ok(Config::default())
    }
}

fn run_simulation(
    config: Config,
    ticks: Option<u64>,
    quiet: bool,
    time_limit: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = PathBuf::from(&config.logging.report_dir);
    std::fs::create_dir_all(&output)?;

    let mut world = World::new(config)?;
    log::info!(
        "Starting simulation: {}x{} grid, seed {}",
        world.grid().width(),
        world.grid().height(),
        world.seed()
    );

    let stop = StopFlag::new();
    if let Some(secs) = time_limit {
        let stop = stop.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            stop.stop();
        });
    }

    if !quiet {
        println!("{}", UpdateRow::csv_header());
    }

    let start = Instant::now();
    world.run_until(ticks.unwrap_or(u64::MAX), &stop, |_, events| {
        if let Some(row) = &events.update {
            if !quiet {
                println!("{}", row);
            }
        }
    });
    let elapsed = start.elapsed().as_secs_f64();

    log::info!(
        "Simulation complete: {} ticks in {:.2}s ({:.1} cells/s), {} viable cells",
        world.tick(),
        elapsed,
        world.tick() as f64 / elapsed.max(f64::MIN_POSITIVE),
        world.viable_cells()
    );

    if world.config().logging.history {
        let path = output.join("stats_history.json");
        world.history().save(&path)?;
        log::info!("History saved to {}", path.display());
    }

    Ok(())
}
