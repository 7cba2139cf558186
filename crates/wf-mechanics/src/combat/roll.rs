//! Randomized combat generation: attacks, party rolls and loot.

use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

use super::{Attack, CombatState, LootPile};
use crate::random::roll_d20;
use crate::settings::SessionSettings;

/// Per-round damage cap.
pub const MAX_DAMAGE: u32 = 10;

/// Rounds a fight may last before damage starts escalating.
const ESCALATION_START: u32 = 6;
const ESCALATION_RATE: f64 = 1.2;
const SLOW_ROUND_PENALTY: f64 = 1.5;

/// Whether `round` (1-based) is a surge round.
///
/// True iff `round` is a multiple of `period`. A zero period never surges.
pub fn is_surge_round(round: u32, period: u32) -> bool {
    if period == 0 {
        return false;
    }
    let round = i64::from(round);
    let period = i64::from(period);
    period - ((round - 1) % period + 1) == 0
}

/// Number of enemy hits this round, before rounding.
///
/// Starts at the remaining tier. A slow party takes half again as many hits.
/// Past round six, a lone tier-1 enemy and a lone surviving adventurer (in a
/// multi-player game) each add an independent `1.2^(round - 6)` factor.
pub fn attack_count(state: &CombatState, settings: &SessionSettings, elapsed_millis: u64) -> f64 {
    let mut count = f64::from(state.tier);
    if elapsed_millis > state.round_time_millis {
        count *= SLOW_ROUND_PENALTY;
    }

    let escalation = state
        .round_count
        .checked_sub(ESCALATION_START)
        .filter(|&n| n > 0)
        .map(|n| ESCALATION_RATE.powi(n as i32));
    if let Some(factor) = escalation {
        if state.tier == 1 {
            count *= factor;
        }
        if state.num_alive_adventurers == 1 && settings.num_players > 1 {
            count *= factor;
        }
    }
    count
}

fn hit_damage(rng: &mut StdRng) -> u32 {
    let r: f64 = rng.random();
    if r < 0.35 {
        0
    } else if r < 0.45 {
        2
    } else {
        1
    }
}

/// Generate the enemies' attack for the round that just ended.
pub fn generate_attack(
    state: &CombatState,
    settings: &SessionSettings,
    elapsed_millis: u64,
    rng: &mut StdRng,
) -> Attack {
    let hits = attack_count(state, settings, elapsed_millis).round() as u32;
    let raw: u32 = (0..hits).map(|_| hit_damage(rng)).sum();

    let scaled = f64::from(raw) * state.damage_multiplier * settings.player_damage_multiplier();
    let damage = if scaled > 1.0 {
        scaled.round()
    } else {
        scaled.ceil()
    };

    let attack = Attack {
        damage: (damage.max(0.0) as u32).min(MAX_DAMAGE),
        surge: state.is_surge_round(state.round_count + 1),
    };
    debug!(hits, raw, damage = attack.damage, surge = attack.surge, "generated attack");
    attack
}

/// Roll one d20 per player.
pub fn generate_rolls(count: u32, rng: &mut StdRng) -> Vec<u32> {
    (0..count).map(|_| roll_d20(rng)).collect()
}

/// Loot budget for a fight whose strongest point reached `max_tier`.
///
/// Follows a logarithmic curve: 1-2 give 1, 3 gives 2, 4 gives 3, 8 gives 5.
pub fn loot_budget(max_tier: u32) -> u32 {
    let curve = (f64::from(max_tier) - 1.0).ln() / 1.5_f64.ln();
    curve.round().max(1.0) as u32
}

/// Spend the loot budget for `max_tier` on piles of tier 1-3.
///
/// Piles come out in tier order and empty piles are left out.
pub fn generate_loot(max_tier: u32, rng: &mut StdRng) -> Vec<LootPile> {
    let mut counts = [0u32; 3];
    let mut budget = loot_budget(max_tier);

    while budget > 0 {
        let r: f64 = rng.random();
        let tier = if r < 0.1 && budget >= 3 {
            3
        } else if r < 0.4 && budget >= 2 {
            2
        } else {
            1
        };
        counts[tier as usize - 1] += 1;
        budget -= tier;
    }

    debug!(max_tier, ?counts, "generated loot");
    counts
        .iter()
        .zip(1..)
        .filter(|&(&count, _)| count > 0)
        .map(|(&count, tier)| LootPile { tier, count })
        .collect()
}
