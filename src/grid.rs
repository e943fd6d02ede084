//! Toroidal grid of cells and neighbor lookup.
//!
//! Cells are stored row-major at `x + width * y`, the same index that selects a
//! cell's RNG stream. Each slot sits behind its own mutex so that neighbor
//! writes from concurrently executing cells are serialized per cell.

use crate::cell::Cell;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The four neighbor directions a cell can face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    /// Direction encoded in the low two bits of a register value.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Self::ALL[(bits & 3) as usize]
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Neighbor of `(x, y)` on a `width` x `height` torus.
#[inline]
pub fn neighbor(width: usize, height: usize, x: usize, y: usize, dir: Direction) -> (usize, usize) {
    match dir {
        Direction::Left => (if x == 0 { width - 1 } else { x - 1 }, y),
        Direction::Right => (if x + 1 >= width { 0 } else { x + 1 }, y),
        Direction::Up => (x, if y == 0 { height - 1 } else { y - 1 }),
        Direction::Down => (x, if y + 1 >= height { 0 } else { y + 1 }),
    }
}

/// Fixed-size arena of cells.
pub struct Grid {
    width: usize,
    height: usize,
    genome_len: usize,
    cells: Vec<Mutex<Cell>>,
}

impl Grid {
    /// Grid of inert cells.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is below 2, since a cell would then be its
    /// own neighbor. `Config::validate` rejects such sizes first.
    pub fn new(width: usize, height: usize, genome_len: usize) -> Self {
        assert!(width >= 2 && height >= 2, "grid must be at least 2x2");
        let cells = (0..width * height)
            .map(|_| Mutex::new(Cell::empty(genome_len)))
            .collect();
        Self {
            width,
            height,
            genome_len,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Genome length in units.
    pub fn genome_len(&self) -> usize {
        self.genome_len
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x + self.width * y
    }

    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    #[inline]
    pub fn neighbor(&self, x: usize, y: usize, dir: Direction) -> (usize, usize) {
        neighbor(self.width, self.height, x, y, dir)
    }

    #[inline]
    pub fn neighbor_index(&self, index: usize, dir: Direction) -> usize {
        let (x, y) = self.coords(index);
        let (nx, ny) = self.neighbor(x, y, dir);
        self.index(nx, ny)
    }

    /// Lock a single cell.
    #[inline]
    pub fn lock(&self, index: usize) -> MutexGuard<'_, Cell> {
        self.cells[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock two distinct cells, always acquiring the lower index first.
    /// Guards are returned in argument order.
    pub fn lock_pair(&self, a: usize, b: usize) -> (MutexGuard<'_, Cell>, MutexGuard<'_, Cell>) {
        assert_ne!(a, b, "cannot lock a cell against itself");
        if a < b {
            let first = self.lock(a);
            let second = self.lock(b);
            (first, second)
        } else {
            let second = self.lock(b);
            let first = self.lock(a);
            (first, second)
        }
    }

    /// Exclusive access without locking.
    pub fn get_mut(&mut self, index: usize) -> &mut Cell {
        self.cells[index]
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the cell at `(x, y)`.
    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.lock(self.index(x, y)).clone()
    }

    /// Replace the cell at `(x, y)`.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        let index = self.index(x, y);
        *self.get_mut(index) = cell;
    }

    /// Visit every cell in index order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, &Cell),
    {
        for (index, slot) in self.cells.iter().enumerate() {
            let cell = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f(index, &cell);
        }
    }

    /// Copy of every cell in index order.
    pub fn snapshot(&self) -> Vec<Cell> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|_, cell| out.push(cell.clone()));
        out
    }

    /// Sum of energy over all cells.
    pub fn total_energy(&self) -> u64 {
        let mut total = 0u64;
        self.for_each(|_, cell| total += cell.energy);
        total
    }
}
