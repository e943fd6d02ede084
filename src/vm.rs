//! The cell virtual machine.
//!
//! [`Vm`] holds the per-execution state (register, pointers, facing, output
//! buffer, loop stack) and dispatches one instruction at a time against the
//! executing cell's genome. It never touches the grid: instructions that act on
//! a neighbor come back as an [`Effect`] for the caller to apply.

use crate::genome::{Genome, Opcode, EXEC_START};
use crate::grid::Direction;
use rand::RngCore;

/// Neighbor interaction requested by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Kill { toward: Direction, guess: u8 },
    Share { toward: Direction, guess: u8 },
}

/// Outcome of the per-instruction mutation roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    None,
    /// Execute this unit instead of the fetched one.
    Instruction(u8),
    /// Overwrite the register before executing.
    Register(u8),
}

impl Mutation {
    /// One 64-bit draw per instruction; if its low 32 bits fall under `rate`, a
    /// second draw replaces either the instruction (bit 7 set) or the register
    /// with its low nibble.
    ///
    /// Depends on nothing but the stream, so it can be drawn before the cell is
    /// locked.
    #[inline]
    pub fn roll<R: RngCore + ?Sized>(rate: u32, rng: &mut R) -> Self {
        if (rng.next_u64() & 0xffff_ffff) >= rate as u64 {
            return Mutation::None;
        }
        let roll = rng.next_u64();
        let value = (roll & 0xf) as u8;
        if roll & 0x80 != 0 {
            Mutation::Instruction(value)
        } else {
            Mutation::Register(value)
        }
    }
}

/// Virtual machine state for one cell execution.
#[derive(Debug, Clone)]
pub struct Vm {
    /// The single 4-bit register.
    pub reg: u8,
    /// Genome/output-buffer pointer, in units.
    pub ptr: usize,
    /// Execution pointer, in units.
    pub exec: usize,
    pub facing: Direction,
    /// Candidate offspring.
    pub output: Genome,
    loop_stack: Vec<usize>,
    false_loop_depth: usize,
    stopped: bool,
    genome_len: usize,
}

impl Vm {
    pub fn new(genome_len: usize) -> Self {
        Self {
            reg: 0,
            ptr: 0,
            exec: EXEC_START,
            facing: Direction::Left,
            output: Genome::sentinel(genome_len),
            loop_stack: Vec::with_capacity(genome_len),
            false_loop_depth: 0,
            stopped: false,
            genome_len,
        }
    }

    /// Reset for a new execution, reusing the buffers.
    pub fn reset(&mut self) {
        self.reg = 0;
        self.ptr = 0;
        self.exec = EXEC_START;
        self.facing = Direction::Left;
        self.output.clear();
        self.loop_stack.clear();
        self.false_loop_depth = 0;
        self.stopped = false;
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Inside a LOOP whose register was zero, skipping to the matching REP.
    #[inline]
    pub fn is_skipping(&self) -> bool {
        self.false_loop_depth > 0
    }

    pub fn loop_depth(&self) -> usize {
        self.loop_stack.len()
    }

    /// Whether the output buffer holds a candidate offspring.
    #[inline]
    pub fn has_offspring(&self) -> bool {
        !self.output.is_blank()
    }

    #[inline]
    pub fn fetch(&self, genome: &Genome) -> u8 {
        genome.get(self.exec)
    }

    /// Apply a mutation rolled for the fetched unit and return the unit to
    /// execute.
    #[inline]
    pub fn apply(&mut self, unit: u8, mutation: Mutation) -> u8 {
        match mutation {
            Mutation::None => unit,
            Mutation::Instruction(replacement) => replacement,
            Mutation::Register(value) => {
                self.reg = value;
                unit
            }
        }
    }

    /// Roll and apply in one go.
    #[inline]
    pub fn mutate<R: RngCore + ?Sized>(&mut self, unit: u8, rate: u32, rng: &mut R) -> u8 {
        self.apply(unit, Mutation::roll(rate, rng))
    }

    /// Execute `unit` against `genome` and advance the execution pointer.
    pub fn execute(&mut self, unit: u8, genome: &mut Genome) -> Effect {
        let op = Opcode::from_unit(unit);

        if self.is_skipping() {
            match op {
                Opcode::Loop => self.false_loop_depth += 1,
                Opcode::Rep => self.false_loop_depth -= 1,
                _ => {}
            }
            self.advance();
            return Effect::None;
        }

        let mut effect = Effect::None;
        match op {
            Opcode::Zero => {
                self.reg = 0;
                self.ptr = 0;
                self.facing = Direction::Left;
            }
            Opcode::Fwd => {
                self.ptr = if self.ptr + 1 >= self.genome_len { 0 } else { self.ptr + 1 };
            }
            Opcode::Back => {
                self.ptr = if self.ptr == 0 { self.genome_len - 1 } else { self.ptr - 1 };
            }
            Opcode::Inc => self.reg = (self.reg + 1) & 0xf,
            Opcode::Dec => self.reg = self.reg.wrapping_sub(1) & 0xf,
            Opcode::ReadG => self.reg = genome.get(self.ptr),
            Opcode::WriteG => genome.set(self.ptr, self.reg),
            Opcode::ReadB => self.reg = self.output.get(self.ptr),
            Opcode::WriteB => self.output.set(self.ptr, self.reg),
            Opcode::Loop => {
                if self.reg != 0 {
                    if self.loop_stack.len() >= self.genome_len {
                        // Stack overflow ends the execution.
                        self.stopped = true;
                    } else {
                        self.loop_stack.push(self.exec);
                    }
                } else {
                    self.false_loop_depth = 1;
                }
            }
            Opcode::Rep => {
                if let Some(target) = self.loop_stack.pop() {
                    if self.reg != 0 {
                        // Jump back onto the LOOP so it runs again.
                        self.exec = target;
                        return Effect::None;
                    }
                }
            }
            Opcode::Turn => self.facing = Direction::from_bits(self.reg),
            Opcode::Xchg => {
                self.advance();
                let held = self.reg;
                self.reg = genome.get(self.exec);
                genome.set(self.exec, held);
            }
            Opcode::Kill => {
                effect = Effect::Kill {
                    toward: self.facing,
                    guess: self.reg,
                }
            }
            Opcode::Share => {
                effect = Effect::Share {
                    toward: self.facing,
                    guess: self.reg,
                }
            }
            Opcode::Stop => self.stopped = true,
        }

        self.advance();
        effect
    }

    /// Move to the next unit, wrapping past the end back to the first
    /// instruction after the logo.
    #[inline]
    fn advance(&mut self) {
        self.exec += 1;
        if self.exec >= self.genome_len {
            self.exec = EXEC_START;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_mt::Mt;

    const LEN: usize = 32;

    /// Run `units` (placed after a zero logo) until STOP or `limit` steps.
    fn run(units: &[u8], limit: usize) -> (Vm, Genome, Vec<Effect>) {
        let mut program = vec![0u8];
        program.extend_from_slice(units);
        let mut genome = Genome::from_units(&program, LEN);
        let mut vm = Vm::new(LEN);
        let mut effects = Vec::new();
        for _ in 0..limit {
            if vm.is_stopped() {
                break;
            }
            let unit = vm.fetch(&genome);
            let effect = vm.execute(unit, &mut genome);
            if effect != Effect::None {
                effects.push(effect);
            }
        }
        (vm, genome, effects)
    }

    #[test]
    fn test_inc_dec_wrap() {
        let (vm, _, _) = run(&[0x4, 0xf], 10);
        assert_eq!(vm.reg, 15);
        let (vm, _, _) = run(&[0x4, 0x3, 0x3, 0xf], 10);
        assert_eq!(vm.reg, 1);
    }

    #[test]
    fn test_pointer_wraps() {
        let (vm, _, _) = run(&[0x2, 0xf], 10);
        assert_eq!(vm.ptr, LEN - 1);
        let (vm, _, _) = run(&[0x2, 0x1, 0xf], 10);
        assert_eq!(vm.ptr, 0);
    }

    #[test]
    fn test_zero_resets_state() {
        let (vm, _, _) = run(&[0x3, 0x3, 0xb, 0x1, 0x0, 0xf], 10);
        assert_eq!(vm.reg, 0);
        assert_eq!(vm.ptr, 0);
        assert_eq!(vm.facing, Direction::Left);
    }

    #[test]
    fn test_turn_uses_low_bits() {
        // reg = 7 -> facing 3 (Down)
        let (vm, _, _) = run(&[0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0xb, 0xf], 20);
        assert_eq!(vm.facing, Direction::Down);
    }

    #[test]
    fn test_genome_read_write() {
        // INC, WRITEG at ptr 0 (the logo), READG back after clearing reg.
        let (vm, genome, _) = run(&[0x3, 0x6, 0x0, 0x5, 0xf], 10);
        assert_eq!(genome.get(0), 1);
        assert_eq!(vm.reg, 1);
    }

    #[test]
    fn test_buffer_read_write() {
        let (vm, genome, _) = run(&[0x3, 0x3, 0x8, 0x7, 0xf], 10);
        assert_eq!(vm.output.get(0), 2);
        assert_eq!(vm.reg, 2);
        assert!(vm.has_offspring());
        // The genome itself is untouched.
        assert_eq!(genome.get(0), 0);
    }

    #[test]
    fn test_false_loop_skips_body() {
        // reg = 0: LOOP skips INC INC up to REP, then INC runs once.
        let (vm, _, _) = run(&[0x9, 0x3, 0x3, 0xa, 0x3, 0xf], 20);
        assert_eq!(vm.reg, 1);
        assert!(!vm.is_skipping());
    }

    #[test]
    fn test_nested_false_loop() {
        let (vm, _, _) = run(&[0x9, 0x9, 0x3, 0xa, 0x3, 0xa, 0x3, 0x3, 0xf], 20);
        assert_eq!(vm.reg, 2);
    }

    #[test]
    fn test_loop_counts_down() {
        // reg = 3; LOOP DEC REP runs the body three times.
        let (vm, _, _) = run(&[0x3, 0x3, 0x3, 0x9, 0x4, 0xa, 0xf], 50);
        assert_eq!(vm.reg, 0);
        assert_eq!(vm.loop_depth(), 0);
        assert!(vm.is_stopped());
    }

    #[test]
    fn test_rep_without_loop_is_noop() {
        let (vm, _, _) = run(&[0x3, 0xa, 0x3, 0xf], 10);
        assert_eq!(vm.reg, 2);
    }

    #[test]
    fn test_xchg_swaps_next_unit() {
        // INC, XCHG <0x7>: reg takes 7, unit 3 becomes 1 and is never run.
        let (vm, genome, _) = run(&[0x3, 0xc, 0x7, 0xf], 10);
        assert_eq!(vm.reg, 7);
        assert_eq!(genome.get(3), 1);
        assert!(vm.is_stopped());
    }

    #[test]
    fn test_xchg_wraps_past_end() {
        let mut genome = Genome::sentinel(LEN);
        genome.set(0, 0x2);
        genome.set(1, 0x4);
        genome.set(LEN - 1, 0xc);
        let mut vm = Vm::new(LEN);
        vm.exec = LEN - 1;
        vm.reg = 9;
        vm.execute(0xc, &mut genome);
        // Skips past the logo onto unit 1.
        assert_eq!(vm.reg, 0x4);
        assert_eq!(genome.get(1), 9);
        assert_eq!(genome.get(0), 0x2);
        assert_eq!(vm.exec, 2);
    }

    #[test]
    fn test_exec_wraps_to_first_instruction() {
        let mut genome = Genome::from_units(&[0x0; LEN], LEN);
        let mut vm = Vm::new(LEN);
        for _ in 0..(LEN - 1) {
            let unit = vm.fetch(&genome);
            vm.execute(unit, &mut genome);
        }
        assert_eq!(vm.exec, EXEC_START);
    }

    #[test]
    fn test_neighbor_effects() {
        let (_, _, effects) = run(&[0x3, 0xb, 0xd, 0x3, 0xe, 0xf], 10);
        assert_eq!(
            effects,
            vec![
                Effect::Kill {
                    toward: Direction::Right,
                    guess: 1
                },
                Effect::Share {
                    toward: Direction::Right,
                    guess: 2
                },
            ]
        );
    }

    #[test]
    fn test_loop_stack_overflow_stops() {
        let mut units = vec![0x3u8];
        units.extend(std::iter::repeat(0x9).take(LEN - 2));
        let (vm, _, _) = run(&units, 1000);
        assert!(vm.is_stopped());
        assert_eq!(vm.loop_depth(), LEN);
        assert!(vm.exec < LEN);
        assert!(vm.ptr < LEN);
    }

    #[test]
    fn test_reset() {
        let (mut vm, _, _) = run(&[0x3, 0x8, 0x9, 0xf], 10);
        vm.reset();
        assert_eq!(vm.reg, 0);
        assert_eq!(vm.exec, EXEC_START);
        assert_eq!(vm.loop_depth(), 0);
        assert!(!vm.has_offspring());
        assert!(!vm.is_stopped());
    }

    #[test]
    fn test_apply_mutation() {
        let mut vm = Vm::new(LEN);
        assert_eq!(vm.apply(0x3, Mutation::None), 0x3);
        assert_eq!(vm.apply(0x3, Mutation::Instruction(0xd)), 0xd);
        assert_eq!(vm.reg, 0);
        assert_eq!(vm.apply(0x3, Mutation::Register(0x9)), 0x3);
        assert_eq!(vm.reg, 0x9);
    }

    #[test]
    fn test_zero_rate_never_mutates() {
        let mut vm = Vm::new(LEN);
        let mut rng = Mt::new(1);
        for unit in 0..16u8 {
            for _ in 0..100 {
                assert_eq!(vm.mutate(unit, 0, &mut rng), unit);
            }
        }
        assert_eq!(vm.reg, 0);
    }

    #[test]
    fn test_full_rate_always_mutates() {
        let mut vm = Vm::new(LEN);
        let mut rng = Mt::new(2);
        let mut check = Mt::new(2);
        for _ in 0..200 {
            let reg_before = vm.reg;
            let out = vm.mutate(0x0, u32::MAX, &mut rng);
            let gate = check.next_u64() & 0xffff_ffff;
            if gate < u32::MAX as u64 {
                let roll = check.next_u64();
                if roll & 0x80 != 0 {
                    assert_eq!(out, (roll & 0xf) as u8);
                    assert_eq!(vm.reg, reg_before);
                } else {
                    assert_eq!(out, 0x0);
                    assert_eq!(vm.reg, (roll & 0xf) as u8);
                }
            }
        }
    }
}
