//! World simulation engine: batch scheduling, inflow and periodic hooks.

use crate::cell::Cell;
use crate::config::{Config, ConfigError};
use crate::execute::{execute_cell, ExecContext, IdAllocator};
use crate::genome::Genome;
use crate::grid::Grid;
use crate::report;
use crate::rng::RngPool;
use crate::stats::{StatCounters, StatsHistory, UpdateRow, ViabilityEvent, ViabilityTracker};
use crate::vm::Vm;
use rand::RngCore;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What happened at the end of a batch.
#[derive(Debug, Clone, Default)]
pub struct StepEvents {
    /// Update row, when an update interval was crossed.
    pub update: Option<UpdateRow>,
    /// Report file written, when a report interval was crossed.
    pub report: Option<PathBuf>,
    /// Inflows performed.
    pub inflows: u64,
}

/// Number of multiples of `every` in `(prev, now]`.
#[inline]
fn crossings(prev: u64, now: u64, every: u64) -> u64 {
    if every == 0 {
        0
    } else {
        now / every - prev / every
    }
}

/// The simulation world
pub struct World {
    grid: Grid,
    rngs: RngPool,
    ids: IdAllocator,
    pool: rayon::ThreadPool,

    // State
    tick: u64,
    inflow_total: u64,

    // Configuration
    config: Config,
    seed: u32,

    // Statistics
    counters: StatCounters,
    history: StatsHistory,
    viability: ViabilityTracker,
}

impl World {
    /// Create a world seeded from `config.scheduler.seed`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let seed = config.scheduler.seed;
        Self::new_with_seed(config, seed)
    }

    /// Create a new world with a specific seed for reproducibility
    pub fn new_with_seed(config: Config, seed: u32) -> Result<Self, ConfigError> {
        config.validate()?;

        let threads = config.scheduler.threads;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pond-worker-{}", i))
            .build()
            .map_err(|source| ConfigError::ThreadPool { threads, source })?;

        let grid = Grid::new(
            config.grid.width,
            config.grid.height,
            config.genome.max_instr,
        );
        let mut rngs = RngPool::new(seed, grid.len());
        let global = rngs.global();
        for _ in 0..config.scheduler.rng_warmup {
            global.next_u64();
        }

        log::info!(
            "World {}x{} genome={} seed={} threads={}",
            grid.width(),
            grid.height(),
            grid.genome_len(),
            seed,
            pool.current_num_threads()
        );

        Ok(Self {
            grid,
            rngs,
            ids: IdAllocator::new(),
            pool,
            tick: 0,
            inflow_total: 0,
            history: StatsHistory::new(
                config.logging.update_interval,
                config.logging.history_limit,
            ),
            config,
            seed,
            counters: StatCounters::new(),
            viability: ViabilityTracker::new(),
        })
    }

    /// Run one batch and any hooks it triggers.
    pub fn step(&mut self) -> StepEvents {
        let prev = self.tick;
        let picks = self.pick_batch();
        self.execute_batch(picks);
        self.tick += self.config.scheduler.batch_size as u64;

        let mut events = StepEvents::default();

        let inflows = crossings(prev, self.tick, self.config.inflow.frequency);
        for _ in 0..inflows {
            self.inflow();
        }
        events.inflows = inflows;

        if crossings(prev, self.tick, self.config.logging.update_interval) > 0 {
            events.update = Some(self.update());
        }

        if crossings(prev, self.tick, self.config.logging.report_interval) > 0 {
            let dir = PathBuf::from(&self.config.logging.report_dir);
            events.report = self.write_report(dir);
        }

        events
    }

    /// Draw `batch_size` grid indices from the global stream, x then y.
    fn pick_batch(&mut self) -> Vec<usize> {
        let (width, height) = (self.grid.width() as u64, self.grid.height() as u64);
        let global = self.rngs.global();
        (0..self.config.scheduler.batch_size)
            .map(|_| {
                let x = (global.next_u64() % width) as usize;
                let y = (global.next_u64() % height) as usize;
                x + y * width as usize
            })
            .collect()
    }

    /// Execute the picked cells in parallel. A cell picked more than once runs
    /// that many times back to back on the same worker.
    fn execute_batch(&mut self, mut picks: Vec<usize>) {
        picks.sort_unstable();
        let mut distinct: Vec<usize> = Vec::with_capacity(picks.len());
        let mut repeats: Vec<usize> = Vec::with_capacity(picks.len());
        for index in picks {
            match distinct.last() {
                Some(&last) if last == index => {
                    if let Some(count) = repeats.last_mut() {
                        *count += 1;
                    }
                }
                _ => {
                    distinct.push(index);
                    repeats.push(1);
                }
            }
        }

        let ctx = ExecContext {
            grid: &self.grid,
            ids: &self.ids,
            mutation_rate: self.config.evolution.mutation_rate,
            failed_kill_penalty: self.config.evolution.failed_kill_penalty,
        };
        let genome_len = self.grid.genome_len();
        let streams = self.rngs.streams_for(&distinct);
        let jobs: Vec<_> = distinct
            .iter()
            .copied()
            .zip(repeats)
            .zip(streams)
            .collect();

        let batch = self.pool.install(|| {
            jobs.into_par_iter()
                .map_init(
                    || Vm::new(genome_len),
                    |vm, ((index, count), rng)| {
                        let mut stats = StatCounters::new();
                        for _ in 0..count {
                            execute_cell(&ctx, index, rng, vm, &mut stats);
                        }
                        stats
                    },
                )
                .reduce(StatCounters::default, StatCounters::merge)
        });

        self.counters.absorb(&batch);
    }

    /// Drop a random genome and some energy on a random cell.
    pub fn inflow(&mut self) {
        let (width, height) = (self.grid.width() as u64, self.grid.height() as u64);
        let inflow = &self.config.inflow;
        let global = self.rngs.global();

        let x = (global.next_u64() % width) as usize;
        let y = (global.next_u64() % height) as usize;
        let mut energy = inflow.base;
        if inflow.variation > 0 {
            energy += global.next_u64() % inflow.variation;
        }
        let genome = Genome::random(self.grid.genome_len(), global);

        let id = self.ids.next();
        let index = self.grid.index(x, y);
        self.grid.get_mut(index).seed(id, energy, genome);
        self.inflow_total += energy;
    }

    /// Census the grid, log viability changes and start a new counting interval.
    pub fn update(&mut self) -> UpdateRow {
        let row = UpdateRow::collect(self.tick, &self.grid, &self.counters);

        match self.viability.observe(row.viable_cells) {
            Some(ViabilityEvent::Appeared) => log::info!(
                "[EVENT] Viable replicators appeared at tick {} ({} cells)",
                row.tick,
                row.viable_cells
            ),
            Some(ViabilityEvent::Extinct) => {
                log::warn!("[EVENT] Viable replicators extinct at tick {}", row.tick)
            }
            None => {}
        }
        log::debug!(
            "tick={} energy={} active={} viable={} max_gen={}",
            row.tick,
            row.total_energy,
            row.active_cells,
            row.viable_cells,
            row.max_generation
        );

        if self.config.logging.history {
            self.history.record(row.clone());
        }
        self.counters.reset();
        row
    }

    /// Write a report file into `dir`. Failures are logged and skipped.
    pub fn write_report<P: Into<PathBuf>>(&self, dir: P) -> Option<PathBuf> {
        match report::write_report(dir.into(), self.tick, &self.grid) {
            Ok((path, _)) => Some(path),
            Err(e) => {
                log::warn!("[REPORT] {}", e);
                None
            }
        }
    }

    /// Execute the cell at `(x, y)` once, outside of any batch.
    pub fn execute_at(&mut self, x: usize, y: usize) {
        let index = self.grid.index(x, y);
        let ctx = ExecContext {
            grid: &self.grid,
            ids: &self.ids,
            mutation_rate: self.config.evolution.mutation_rate,
            failed_kill_penalty: self.config.evolution.failed_kill_penalty,
        };
        let mut vm = Vm::new(self.grid.genome_len());
        execute_cell(
            &ctx,
            index,
            self.rngs.stream(index),
            &mut vm,
            &mut self.counters,
        );
    }

    /// Run for at least `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        self.run_with_callback(ticks, |_, _| {});
    }

    /// Run simulation with a callback after every batch
    pub fn run_with_callback<F>(&mut self, ticks: u64, callback: F)
    where
        F: FnMut(&World, &StepEvents),
    {
        self.run_until(ticks, &StopFlag::new(), callback);
    }

    /// Run until `ticks` more ticks have passed or `stop` is raised.
    /// Returns the ticks actually run.
    pub fn run_until<F>(&mut self, ticks: u64, stop: &StopFlag, mut callback: F) -> u64
    where
        F: FnMut(&World, &StepEvents),
    {
        let start = self.tick;
        let end = start.saturating_add(ticks);
        while self.tick < end {
            if stop.is_stopped() {
                log::info!("Stopped at tick {}", self.tick);
                break;
            }
            let events = self.step();
            callback(self, &events);
        }
        self.tick - start
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// Copy of the cell at `(x, y)`.
    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.grid.cell(x, y)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get seed for reproducibility
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Cell executions so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Energy added by inflow since the start.
    pub fn inflow_total(&self) -> u64 {
        self.inflow_total
    }

    /// Counters accumulated since the last update.
    pub fn counters(&self) -> &StatCounters {
        &self.counters
    }

    pub fn history(&self) -> &StatsHistory {
        &self.history
    }

    /// Streams expanded so far, the global stream included.
    pub fn materialized_streams(&self) -> usize {
        self.rngs.materialized()
    }

    pub fn total_energy(&self) -> u64 {
        self.grid.total_energy()
    }

    pub fn active_cells(&self) -> usize {
        let mut n = 0;
        self.grid.for_each(|_, cell| {
            if cell.is_alive() {
                n += 1;
            }
        });
        n
    }

    pub fn viable_cells(&self) -> usize {
        let mut n = 0;
        self.grid.for_each(|_, cell| {
            if cell.is_reportable() {
                n += 1;
            }
        });
        n
    }
}
