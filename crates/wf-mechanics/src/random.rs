//! Seeded randomness.
//!
//! A quest context carries a single `u64` seed. Operations that need random
//! numbers build a generator from it with [`seeded`], and the shared
//! transition advances the seed with [`next_seed`] afterwards. Because the
//! advance does not depend on how many values were drawn, a peer that only
//! applies the recorded results ends up with the same seed as the peer that
//! rolled them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sides on the die used for combat and skill-check rolls.
pub const D20: u32 = 20;

/// Build a generator for the given context seed.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Derive the next context seed (splitmix64 step).
pub fn next_seed(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Roll a single d20.
pub fn roll_d20(rng: &mut StdRng) -> u32 {
    rng.random_range(1..=D20)
}

/// Pick a uniformly random element. Returns `None` for an empty slice.
pub fn choose<'a, T>(items: &'a [T], rng: &mut StdRng) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    let index = (rng.random::<f64>() * items.len() as f64).floor() as usize;
    items.get(index.min(items.len() - 1))
}
