//! Running one cell's genome against the grid.
//!
//! The executing cell is locked for one instruction at a time, and the
//! instruction's mutation roll is drawn before that lock is taken. KILL, SHARE and
//! the final replication lock the actor and its neighbor together (lower index
//! first) only while they read and write the pair, so concurrent executions on
//! adjacent cells interleave at instruction granularity without tearing a
//! cell's fields.

use crate::access::{self, Sense};
use crate::cell::CellId;
use crate::genome::Opcode;
use crate::grid::{Direction, Grid};
use crate::rng::RngStream;
use crate::stats::StatCounters;
use crate::vm::{Effect, Mutation, Vm};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared source of fresh cell ids.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Ids start at 1; 0 is reserved for "no parent".
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: CellId) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    #[inline]
    pub fn next(&self) -> CellId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of the next id to be handed out.
    pub fn peek(&self) -> CellId {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a cell execution needs besides its own stream and VM.
pub struct ExecContext<'a> {
    pub grid: &'a Grid,
    pub ids: &'a IdAllocator,
    /// Mutation probability numerator over 2^32.
    pub mutation_rate: u32,
    /// Failed KILLs on viable cells cost `energy / failed_kill_penalty`.
    pub failed_kill_penalty: u64,
}

/// Execute the cell at `index` until it runs out of energy or stops, then try
/// to place its offspring.
///
/// `rng` must be the stream owned by `index`.
pub fn execute_cell(
    ctx: &ExecContext<'_>,
    index: usize,
    rng: &mut RngStream,
    vm: &mut Vm,
    stats: &mut StatCounters,
) {
    vm.reset();
    stats.cell_executions += 1;

    loop {
        if vm.is_stopped() || !ctx.grid.lock(index).is_alive() {
            break;
        }
        let mutation = Mutation::roll(ctx.mutation_rate, rng);

        let effect = {
            let mut cell = ctx.grid.lock(index);
            // A neighbor's SHARE can drain the cell between the two locks.
            if cell.energy == 0 {
                break;
            }

            let unit = vm.fetch(&cell.genome);
            let unit = vm.apply(unit, mutation);
            cell.energy -= 1;
            if !vm.is_skipping() {
                stats.record(Opcode::from_unit(unit));
            }
            vm.execute(unit, &mut cell.genome)
        };

        match effect {
            Effect::None => {}
            Effect::Kill { toward, guess } => kill(ctx, index, toward, guess, rng, stats),
            Effect::Share { toward, guess } => share(ctx, index, toward, guess, rng, stats),
        }
    }

    replicate(ctx, index, vm, rng, stats);
}

fn kill(
    ctx: &ExecContext<'_>,
    index: usize,
    toward: Direction,
    guess: u8,
    rng: &mut RngStream,
    stats: &mut StatCounters,
) {
    let target_index = ctx.grid.neighbor_index(index, toward);
    let (mut actor, mut target) = ctx.grid.lock_pair(index, target_index);

    if access::allowed(&*target, guess, Sense::Negative, rng) {
        if target.is_viable() {
            stats.viable_killed += 1;
        }
        target.erase(ctx.ids.next());
    } else if target.is_viable() {
        let penalty = actor.energy / ctx.failed_kill_penalty;
        actor.energy = actor.energy.saturating_sub(penalty);
    }
}

fn share(
    ctx: &ExecContext<'_>,
    index: usize,
    toward: Direction,
    guess: u8,
    rng: &mut RngStream,
    stats: &mut StatCounters,
) {
    let target_index = ctx.grid.neighbor_index(index, toward);
    let (mut actor, mut target) = ctx.grid.lock_pair(index, target_index);

    if access::allowed(&*target, guess, Sense::Positive, rng) {
        if target.is_viable() {
            stats.viable_shared += 1;
        }
        let total = actor.energy + target.energy;
        target.energy = total / 2;
        actor.energy = total - target.energy;
    }
}

/// Copy a non-blank output buffer into the faced neighbor, if it is alive and
/// the access check passes.
fn replicate(
    ctx: &ExecContext<'_>,
    index: usize,
    vm: &Vm,
    rng: &mut RngStream,
    stats: &mut StatCounters,
) {
    if !vm.has_offspring() {
        return;
    }

    let target_index = ctx.grid.neighbor_index(index, vm.facing);
    let (parent, mut target) = ctx.grid.lock_pair(index, target_index);

    if target.is_alive() && access::allowed(&*target, vm.reg, Sense::Negative, rng) {
        if target.is_viable() {
            stats.viable_replaced += 1;
        }
        target.inherit(ctx.ids.next(), &parent, &vm.output);
    }
}
