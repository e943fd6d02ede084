//! Stochastic permission check between neighbors.

use crate::cell::Cell;
use rand::RngCore;

/// Which kind of interaction is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// KILL and replication. Favors genetically similar targets.
    Negative,
    /// SHARE. Favors dissimilar targets.
    Positive,
}

/// May an actor guessing `guess` touch `target`?
///
/// A 4-bit draw is compared with the number of bits by which `guess` differs
/// from the target's logo. Targets that never had a real parent are always
/// open. The draw is taken unconditionally so the stream advances the same
/// way whatever the target looks like.
pub fn allowed<R: RngCore + ?Sized>(target: &Cell, guess: u8, sense: Sense, rng: &mut R) -> bool {
    let draw = (rng.next_u64() & 0xf) as u32;
    if target.parent_id == 0 {
        return true;
    }

    let distance = ((target.genome.logo() ^ guess) & 0xf).count_ones();
    match sense {
        Sense::Negative => draw <= distance,
        Sense::Positive => draw >= distance,
    }
}
