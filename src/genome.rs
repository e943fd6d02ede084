//! Packed 4-bit genomes and the instruction set.

use rand::RngCore;

/// Four-bit units packed into each machine word.
pub const UNITS_PER_WORD: usize = 16;

/// Unit at which execution starts; unit 0 is the logo.
pub const EXEC_START: usize = 1;

/// A word of all ones, the "no genetic content" fill.
pub const SENTINEL_WORD: u64 = u64::MAX;

/// Value of the STOP unit, also the sentinel unit.
pub const STOP_UNIT: u8 = 0xf;

/// The 16 instructions of the cell virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Zero = 0x0,
    Fwd = 0x1,
    Back = 0x2,
    Inc = 0x3,
    Dec = 0x4,
    ReadG = 0x5,
    WriteG = 0x6,
    ReadB = 0x7,
    WriteB = 0x8,
    Loop = 0x9,
    Rep = 0xa,
    Turn = 0xb,
    Xchg = 0xc,
    Kill = 0xd,
    Share = 0xe,
    Stop = 0xf,
}

impl Opcode {
    pub const ALL: [Opcode; 16] = [
        Opcode::Zero,
        Opcode::Fwd,
        Opcode::Back,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::ReadG,
        Opcode::WriteG,
        Opcode::ReadB,
        Opcode::WriteB,
        Opcode::Loop,
        Opcode::Rep,
        Opcode::Turn,
        Opcode::Xchg,
        Opcode::Kill,
        Opcode::Share,
        Opcode::Stop,
    ];

    /// Decode the low four bits of a unit. Every value is a valid opcode.
    #[inline]
    pub fn from_unit(unit: u8) -> Self {
        Self::ALL[(unit & 0xf) as usize]
    }

    #[inline]
    pub fn unit(self) -> u8 {
        self as u8
    }
}

/// Fixed-length genome of 4-bit units packed into `u64` words.
///
/// Unit `i` lives in word `i / 16` at bit offset `4 * (i % 16)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Genome {
    words: Box<[u64]>,
}

impl Genome {
    /// All-ones genome of `units` length. `units` must be a multiple of 16.
    pub fn sentinel(units: usize) -> Self {
        debug_assert!(units % UNITS_PER_WORD == 0);
        Self {
            words: vec![SENTINEL_WORD; units / UNITS_PER_WORD].into_boxed_slice(),
        }
    }

    /// Genome whose words are drawn from `rng`, one 64-bit draw per word.
    pub fn random<R: RngCore + ?Sized>(units: usize, rng: &mut R) -> Self {
        let words = (0..units / UNITS_PER_WORD)
            .map(|_| rng.next_u64())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { words }
    }

    /// Build a genome from explicit units, padding the rest with STOP.
    pub fn from_units(units: &[u8], length: usize) -> Self {
        let mut genome = Self::sentinel(length);
        for (i, &unit) in units.iter().take(length).enumerate() {
            genome.set(i, unit);
        }
        genome
    }

    /// Length in units.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len() * UNITS_PER_WORD
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn get(&self, pos: usize) -> u8 {
        let shift = (pos % UNITS_PER_WORD) * 4;
        ((self.words[pos / UNITS_PER_WORD] >> shift) & 0xf) as u8
    }

    #[inline]
    pub fn set(&mut self, pos: usize, unit: u8) {
        let shift = (pos % UNITS_PER_WORD) * 4;
        let word = &mut self.words[pos / UNITS_PER_WORD];
        *word &= !(0xfu64 << shift);
        *word |= ((unit & 0xf) as u64) << shift;
    }

    /// The logo, unit 0, matched against guesses by the access check.
    #[inline]
    pub fn logo(&self) -> u8 {
        (self.words[0] & 0xf) as u8
    }

    /// True when the first byte still holds the all-ones fill.
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.words[0] & 0xff == 0xff
    }

    /// Reset every word to the sentinel.
    pub fn clear(&mut self) {
        self.words.fill(SENTINEL_WORD);
    }

    pub fn copy_from(&mut self, other: &Genome) {
        self.words.copy_from_slice(&other.words);
    }

    pub fn units(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Lowercase hex dump, one digit per unit, ending after four
    /// consecutive STOP units.
    pub fn hex_dump(&self) -> String {
        let mut out = String::with_capacity(self.len());
        let mut stops = 0;
        for unit in self.units() {
            out.push(char::from_digit(unit as u32, 16).unwrap_or('?'));
            if unit == STOP_UNIT {
                stops += 1;
                if stops >= 4 {
                    break;
                }
            } else {
                stops = 0;
            }
        }
        out
    }
}

impl std::fmt::Debug for Genome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Genome({})", self.hex_dump())
    }
}
