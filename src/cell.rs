//! Cell record held by every grid slot.

use crate::genome::Genome;

/// Globally unique cell identifier. Zero means "never assigned".
pub type CellId = u64;

/// Cells above this generation count as viable replicators.
pub const VIABLE_GENERATION: u64 = 2;

/// One grid slot's organism.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub id: CellId,
    pub parent_id: CellId,
    /// Id of the first cell in this line of descent.
    pub lineage: CellId,
    pub generation: u64,
    pub energy: u64,
    pub genome: Genome,
}

impl Cell {
    /// Inert cell: no energy, no ids, all-ones genome.
    pub fn empty(genome_len: usize) -> Self {
        Self {
            id: 0,
            parent_id: 0,
            lineage: 0,
            generation: 0,
            energy: 0,
            genome: Genome::sentinel(genome_len),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.energy > 0
    }

    #[inline]
    pub fn is_viable(&self) -> bool {
        self.generation > VIABLE_GENERATION
    }

    /// Alive and viable; these are the cells that get reported.
    #[inline]
    pub fn is_reportable(&self) -> bool {
        self.is_alive() && self.is_viable()
    }

    /// Inflow: a fresh random cell that starts its own lineage.
    /// Energy is added to whatever the slot already held.
    pub fn seed(&mut self, id: CellId, energy: u64, genome: Genome) {
        self.id = id;
        self.parent_id = 0;
        self.lineage = id;
        self.generation = 0;
        self.energy = self.energy.saturating_add(energy);
        self.genome = genome;
    }

    /// Predation: wipe the genome and lineage, keep the energy.
    pub fn erase(&mut self, id: CellId) {
        self.id = id;
        self.parent_id = 0;
        self.lineage = id;
        self.generation = 0;
        self.genome.clear();
    }

    /// Replication: take `offspring` as the new genome, descended from `parent`.
    pub fn inherit(&mut self, id: CellId, parent: &Cell, offspring: &Genome) {
        self.id = id;
        self.parent_id = parent.id;
        self.lineage = parent.lineage;
        self.generation = parent.generation + 1;
        self.genome.copy_from(offspring);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cell() {
        let cell = Cell::empty(32);
        assert!(!cell.is_alive());
        assert!(!cell.is_viable());
        assert!(cell.genome.is_blank());
    }

    #[test]
    fn test_seed_adds_energy() {
        let mut cell = Cell::empty(16);
        cell.energy = 10;
        cell.generation = 7;
        cell.seed(42, 100, Genome::from_units(&[1, 2], 16));

        assert_eq!(cell.energy, 110);
        assert_eq!(cell.generation, 0);
        assert_eq!(cell.lineage, 42);
        assert_eq!(cell.parent_id, 0);
        assert_eq!(cell.genome.get(1), 2);
    }

    #[test]
    fn test_erase_keeps_energy() {
        let mut cell = Cell::empty(16);
        cell.energy = 55;
        cell.parent_id = 9;
        cell.generation = 4;
        cell.genome.set(0, 0);

        cell.erase(77);

        assert_eq!(cell.energy, 55);
        assert_eq!(cell.parent_id, 0);
        assert_eq!(cell.generation, 0);
        assert_eq!(cell.id, 77);
        assert_eq!(cell.genome, Genome::sentinel(16));
    }

    #[test]
    fn test_inherit() {
        let mut parent = Cell::empty(16);
        parent.id = 5;
        parent.lineage = 2;
        parent.generation = 3;

        let mut child = Cell::empty(16);
        child.energy = 8;
        let offspring = Genome::from_units(&[0xa, 0xb], 16);
        child.inherit(11, &parent, &offspring);

        assert_eq!(child.id, 11);
        assert_eq!(child.parent_id, 5);
        assert_eq!(child.lineage, 2);
        assert_eq!(child.generation, 4);
        assert_eq!(child.energy, 8);
        assert_eq!(child.genome, offspring);
        assert!(child.is_reportable());
    }
}
