//! # nanopond
//!
//! Parallel artificial-life pond: self-replicating 4-bit genomes on a toroidal
//! grid, competing for space and energy.
//!
//! ## Features
//!
//! - **Parallel**: batches of cells run concurrently on a Rayon pool
//! - **Reproducible**: one Mersenne Twister stream per cell, derived from the seed
//! - **Race-free**: every grid cell has its own lock; neighbor interactions
//!   lock both cells in index order
//! - **Configurable**: YAML configuration files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nanopond::{Config, World};
//!
//! let config = Config::default();
//! let mut world = World::new(config).unwrap();
//!
//! world.run_with_callback(1_000_000, |_, events| {
//!     if let Some(row) = &events.update {
//!         println!("{}", row);
//!     }
//! });
//!
//! println!("Viable cells: {}", world.viable_cells());
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use nanopond::Config;
//!
//! let mut config = Config::default();
//! config.grid.width = 128;
//! config.grid.height = 96;
//! config.evolution.mutation_rate = 5000;
//! assert!(config.validate().is_ok());
//! ```

pub mod access;
pub mod cell;
pub mod config;
pub mod execute;
pub mod genome;
pub mod grid;
pub mod report;
pub mod rng;
pub mod stats;
pub mod vm;
pub mod world;

// Re-export main types
pub use cell::Cell;
pub use config::{Config, ConfigError};
pub use genome::{Genome, Opcode};
pub use grid::{Direction, Grid};
pub use stats::{StatCounters, StatsHistory, UpdateRow};
pub use world::{StepEvents, StopFlag, World};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a quick benchmark on a `width` x `height` pond.
pub fn benchmark(ticks: u64, width: usize, height: usize) -> Result<BenchmarkResult, ConfigError> {
    use std::time::Instant;

    let mut config = Config::default();
    config.grid.width = width;
    config.grid.height = height;
    config.logging.report_interval = 0;
    config.logging.history = false;

    let mut world = World::new(config)?;

    let start = Instant::now();
    world.run(ticks);
    let elapsed = start.elapsed();
    let secs = elapsed.as_secs_f64().max(f64::MIN_POSITIVE);

    let final_row = world.update();
    Ok(BenchmarkResult {
        ticks: world.tick(),
        width,
        height,
        elapsed_secs: elapsed.as_secs_f64(),
        ticks_per_second: world.tick() as f64 / secs,
        active_cells: final_row.active_cells,
        viable_cells: final_row.viable_cells,
        max_generation: final_row.max_generation,
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub ticks: u64,
    pub width: usize,
    pub height: usize,
    pub elapsed_secs: f64,
    pub ticks_per_second: f64,
    pub active_cells: u64,
    pub viable_cells: u64,
    pub max_generation: u64,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Grid: {}x{}", self.width, self.height)?;
        writeln!(f, "Ticks: {}", self.ticks)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} cells/s", self.ticks_per_second)?;
        writeln!(f, "Active cells: {}", self.active_cells)?;
        writeln!(f, "Viable cells: {}", self.viable_cells)?;
        writeln!(f, "Max generation: {}", self.max_generation)?;
        Ok(())
    }
}
