//! Statistics tracking for the simulation.

use crate::genome::Opcode;
use crate::grid::Grid;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Counters accumulated between two updates.
///
/// Workers each fill their own copy during a batch; copies are combined with
/// [`merge`](Self::merge), which is associative and commutative.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatCounters {
    /// Executions per opcode (instructions skipped inside a false loop are
    /// not counted).
    pub instructions: [u64; 16],
    /// Cells executed.
    pub cell_executions: u64,
    /// Viable cells overwritten by another cell's offspring.
    pub viable_replaced: u64,
    /// Viable cells KILLed.
    pub viable_killed: u64,
    /// Successful SHAREs with a viable neighbor.
    pub viable_shared: u64,
}

impl StatCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, op: Opcode) {
        self.instructions[op.unit() as usize] += 1;
    }

    /// Total instructions executed.
    pub fn metabolism(&self) -> u64 {
        self.instructions.iter().sum()
    }

    pub fn merge(mut self, other: StatCounters) -> StatCounters {
        self.absorb(&other);
        self
    }

    pub fn absorb(&mut self, other: &StatCounters) {
        for (mine, theirs) in self.instructions.iter_mut().zip(other.instructions.iter()) {
            *mine += theirs;
        }
        self.cell_executions += other.cell_executions;
        self.viable_replaced += other.viable_replaced;
        self.viable_killed += other.viable_killed;
        self.viable_shared += other.viable_shared;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One line of periodic update output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRow {
    pub tick: u64,
    pub total_energy: u64,
    /// Cells with energy.
    pub active_cells: u64,
    /// Cells with energy and generation above the viability threshold.
    pub viable_cells: u64,
    pub max_generation: u64,
    pub viable_replaced: u64,
    pub viable_killed: u64,
    pub viable_shared: u64,
    /// Average executions of each opcode per cell execution.
    pub frequencies: [f64; 16],
    /// Average instructions per cell execution.
    pub metabolism: f64,
}

impl UpdateRow {
    /// Column names, in output order.
    pub fn csv_header() -> String {
        let mut header = String::from(
            "tick,total_energy,active_cells,viable_cells,max_generation,viable_replaced,viable_killed,viable_shared",
        );
        for op in 0..16 {
            header.push_str(&format!(",op{:x}", op));
        }
        header.push_str(",metabolism");
        header
    }

    /// Census the grid and fold in the interval's counters.
    pub fn collect(tick: u64, grid: &Grid, counters: &StatCounters) -> Self {
        let mut row = UpdateRow {
            tick,
            viable_replaced: counters.viable_replaced,
            viable_killed: counters.viable_killed,
            viable_shared: counters.viable_shared,
            ..Default::default()
        };

        grid.for_each(|_, cell| {
            if cell.is_alive() {
                row.active_cells += 1;
                row.total_energy += cell.energy;
                if cell.is_viable() {
                    row.viable_cells += 1;
                }
                row.max_generation = row.max_generation.max(cell.generation);
            }
        });

        let executions = counters.cell_executions as f64;
        let ratio = |count: u64| {
            if counters.cell_executions > 0 {
                count as f64 / executions
            } else {
                0.0
            }
        };
        for (freq, &count) in row.frequencies.iter_mut().zip(counters.instructions.iter()) {
            *freq = ratio(count);
        }
        row.metabolism = ratio(counters.metabolism());

        row
    }

    pub fn to_csv(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UpdateRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{}",
            self.tick,
            self.total_energy,
            self.active_cells,
            self.viable_cells,
            self.max_generation,
            self.viable_replaced,
            self.viable_killed,
            self.viable_shared
        )?;
        for freq in &self.frequencies {
            write!(f, ",{:.4}", freq)?;
        }
        write!(f, ",{:.4}", self.metabolism)
    }
}

/// Change in the presence of viable replicators between two updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViabilityEvent {
    Appeared,
    Extinct,
}

/// Watches successive updates for viable replicators appearing or dying out.
#[derive(Clone, Debug, Default)]
pub struct ViabilityTracker {
    last_viable: u64,
}

impl ViabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, viable: u64) -> Option<ViabilityEvent> {
        let event = match (self.last_viable, viable) {
            (last, 0) if last > 0 => Some(ViabilityEvent::Extinct),
            (0, now) if now > 0 => Some(ViabilityEvent::Appeared),
            _ => None,
        };
        self.last_viable = viable;
        event
    }
}

/// The most recent update rows, oldest first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    pub snapshots: VecDeque<UpdateRow>,
    /// Ticks between snapshots
    pub interval: u64,
    /// Rows kept; older ones are dropped (0 = no limit)
    pub limit: usize,
}

impl StatsHistory {
    pub fn new(interval: u64, limit: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            interval,
            limit,
        }
    }

    pub fn record(&mut self, row: UpdateRow) {
        if self.limit > 0 && self.snapshots.len() >= self.limit {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(row);
    }

    pub fn energy_series(&self) -> Vec<(u64, u64)> {
        self.snapshots
            .iter()
            .map(|s| (s.tick, s.total_energy))
            .collect()
    }

    pub fn viable_series(&self) -> Vec<(u64, u64)> {
        self.snapshots
            .iter()
            .map(|s| (s.tick, s.viable_cells))
            .collect()
    }

    pub fn generation_series(&self) -> Vec<(u64, u64)> {
        self.snapshots
            .iter()
            .map(|s| (s.tick, s.max_generation))
            .collect()
    }

    /// Save history to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
    }

    pub fn load<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums() {
        let mut a = StatCounters::new();
        a.record(Opcode::Inc);
        a.record(Opcode::Inc);
        a.cell_executions = 1;
        a.viable_killed = 2;

        let mut b = StatCounters::new();
        b.record(Opcode::Stop);
        b.cell_executions = 3;
        b.viable_shared = 1;

        let merged = a.clone().merge(b.clone());
        assert_eq!(merged.instructions[0x3], 2);
        assert_eq!(merged.instructions[0xf], 1);
        assert_eq!(merged.cell_executions, 4);
        assert_eq!(merged.viable_killed, 2);
        assert_eq!(merged.viable_shared, 1);
        assert_eq!(merged.metabolism(), 3);

        // Order does not matter.
        assert_eq!(merged, b.merge(a));
    }

    #[test]
    fn test_collect_row() {
        let mut grid = Grid::new(4, 4, 16);
        grid.get_mut(0).energy = 10;
        grid.get_mut(1).energy = 20;
        grid.get_mut(1).generation = 5;
        // Dead cells do not count, whatever their generation.
        grid.get_mut(2).generation = 9;

        let mut counters = StatCounters::new();
        counters.cell_executions = 4;
        counters.instructions[0x3] = 6;
        counters.instructions[0xf] = 2;
        counters.viable_replaced = 1;

        let row = UpdateRow::collect(100, &grid, &counters);
        assert_eq!(row.total_energy, 30);
        assert_eq!(row.active_cells, 2);
        assert_eq!(row.viable_cells, 1);
        assert_eq!(row.max_generation, 5);
        assert_eq!(row.viable_replaced, 1);
        assert!((row.frequencies[0x3] - 1.5).abs() < 1e-12);
        assert!((row.metabolism - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_csv_line() {
        let grid = Grid::new(2, 2, 16);
        let row = UpdateRow::collect(7, &grid, &StatCounters::new());
        let line = row.to_csv();
        let columns: Vec<&str> = line.split(',').collect();

        assert_eq!(columns.len(), 8 + 16 + 1);
        assert_eq!(columns[0], "7");
        // Zero executions render as zero, not NaN.
        assert!(columns[8..].iter().all(|c| *c == "0.0000"));
        assert_eq!(UpdateRow::csv_header().split(',').count(), columns.len());
    }

    #[test]
    fn test_viability_events() {
        let mut tracker = ViabilityTracker::new();
        assert_eq!(tracker.observe(0), None);
        assert_eq!(tracker.observe(3), Some(ViabilityEvent::Appeared));
        assert_eq!(tracker.observe(5), None);
        assert_eq!(tracker.observe(0), Some(ViabilityEvent::Extinct));
        assert_eq!(tracker.observe(0), None);
    }

    #[test]
    fn test_history_series() {
        let mut history = StatsHistory::new(10, 0);
        for i in 0..4u64 {
            history.record(UpdateRow {
                tick: i * 10,
                viable_cells: i,
                total_energy: i * 100,
                max_generation: i + 2,
                ..Default::default()
            });
        }
        let series = history.viable_series();
        assert_eq!(series.len(), 4);
        assert_eq!(series[3], (30, 3));
        assert_eq!(history.energy_series()[2], (20, 200));
        assert_eq!(history.generation_series()[0], (0, 2));
    }

    #[test]
    fn test_history_limit_keeps_latest() {
        let mut history = StatsHistory::new(10, 3);
        for i in 0..10u64 {
            history.record(UpdateRow {
                tick: i * 10,
                ..Default::default()
            });
        }
        assert_eq!(history.snapshots.len(), 3);
        let ticks: Vec<u64> = history.snapshots.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![70, 80, 90]);
    }

    #[test]
    fn test_history_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = StatsHistory::new(5, 100);
        history.record(UpdateRow {
            tick: 5,
            total_energy: 42,
            ..Default::default()
        });
        history.save(&path).unwrap();

        let loaded = StatsHistory::load(&path).unwrap();
        assert_eq!(loaded.snapshots, history.snapshots);
        assert_eq!(loaded.interval, 5);
        assert_eq!(loaded.limit, 100);
    }
}
