//! Combat encounter state.
//!
//! A combat runs in timed rounds. Each round the party races a timer, the
//! enemies hit back with a generated [`Attack`], and every `surge_period`
//! rounds the enemies surge. The encounter ends in victory (with loot and a
//! possible level-up) or defeat.

pub mod roll;

pub use roll::{
    MAX_DAMAGE, attack_count, generate_attack, generate_loot, generate_rolls, is_surge_round,
    loot_budget,
};

use serde::{Deserialize, Serialize};
use wf_core::NodeId;

use crate::error::MechResult;
use crate::settings::SessionSettings;

/// Card phases of a combat encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CombatPhase {
    /// Enemies are revealed.
    DrawEnemies,
    /// The party prepares for the round.
    Prepare,
    /// The round timer is running.
    Timer,
    /// The enemies surge this round.
    Surge,
    /// Adventurers resolve their abilities.
    ResolveAbilities,
    /// Adventurers take the enemy attack.
    ResolveDamage,
    /// The party won.
    Victory,
    /// The party lost.
    Defeat,
    /// A roleplay interlude inside the fight.
    Roleplay,
    /// A skill check inside the fight.
    MidCombatDecision,
}

/// An enemy taking part in a fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Display name.
    pub name: String,
    /// Strength rating.
    pub tier: u32,
    /// Enemy class, when the enemy is catalogued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// The enemies' attack for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attack {
    /// Damage dealt to each adventurer (0-10).
    pub damage: u32,
    /// Whether the next round is a surge round.
    pub surge: bool,
}

/// A pile of loot cards of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootPile {
    /// Loot tier (1-3).
    pub tier: u32,
    /// Number of cards.
    pub count: u32,
}

/// Simulation state of one combat encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    /// Enemies drawn at the start of the fight.
    pub enemies: Vec<Enemy>,
    /// Remaining total enemy tier.
    pub tier: u32,
    /// Completed rounds.
    pub round_count: u32,
    /// Adventurers still standing.
    pub num_alive_adventurers: u32,
    /// Time budget of a round.
    pub round_time_millis: u64,
    /// Difficulty damage scale.
    pub damage_multiplier: f64,
    /// Rounds between surges.
    pub surge_period: u32,
    /// Attack of the last round.
    pub most_recent_attack: Option<Attack>,
    /// Party rolls of the last round.
    pub most_recent_rolls: Vec<u32>,
    /// Roleplay node currently shown inside the fight.
    pub roleplay: Option<NodeId>,
    /// Whether the party levels up after a victory.
    pub level_up: bool,
    /// Loot awarded after a victory.
    pub loot: Vec<LootPile>,
    /// Started from the custom combat screen rather than a quest node.
    pub custom: bool,
    /// Current combat phase.
    pub phase: Option<CombatPhase>,
}

impl CombatState {
    /// Start an encounter against `enemies`.
    ///
    /// Fails when the configured difficulty has no preset.
    pub fn new(settings: &SessionSettings, enemies: Vec<Enemy>, custom: bool) -> MechResult<Self> {
        let difficulty = settings.combat_difficulty()?;
        let tier = enemies.iter().map(|e| e.tier).sum();
        Ok(Self {
            enemies,
            tier,
            round_count: 0,
            num_alive_adventurers: settings.num_players,
            round_time_millis: settings.round_time_millis(),
            damage_multiplier: difficulty.damage_multiplier,
            surge_period: difficulty.surge_period,
            most_recent_attack: None,
            most_recent_rolls: Vec::new(),
            roleplay: None,
            level_up: false,
            loot: Vec::new(),
            custom,
            phase: Some(CombatPhase::DrawEnemies),
        })
    }

    /// Whether `round` is a surge round for this encounter.
    pub fn is_surge_round(&self, round: u32) -> bool {
        is_surge_round(round, self.surge_period)
    }

    /// Record the outcome of a finished round.
    ///
    /// Returns the phase the fight moves to: [`CombatPhase::Surge`] when the
    /// attack announced a surge, otherwise [`CombatPhase::ResolveAbilities`]
    /// (the caller may still divert to a roleplay interlude).
    pub fn record_round(&mut self, attack: Attack, rolls: Vec<u32>) -> CombatPhase {
        self.most_recent_attack = Some(attack);
        self.most_recent_rolls = rolls;
        self.round_count += 1;
        let phase = if attack.surge {
            CombatPhase::Surge
        } else {
            CombatPhase::ResolveAbilities
        };
        self.phase = Some(phase);
        phase
    }

    /// Adjust the remaining enemy tier, never going below zero.
    pub fn tier_sum_delta(&mut self, delta: i64) {
        self.tier = (i64::from(self.tier) + delta).clamp(0, i64::from(u32::MAX)) as u32;
    }

    /// Adjust the number of standing adventurers, kept within `0..=num_players`.
    pub fn adventurer_delta(&mut self, num_players: u32, delta: i64) {
        self.num_alive_adventurers =
            (i64::from(self.num_alive_adventurers) + delta).clamp(0, i64::from(num_players)) as u32;
    }

    /// Finish the encounter.
    ///
    /// `loot` is only kept on victory; callers generate it beforehand with
    /// [`generate_loot`] so the same piles can be replayed elsewhere.
    pub fn end(&mut self, victory: bool, max_tier: u32, num_players: u32, loot: Vec<LootPile>) {
        if victory {
            self.tier = 0;
            self.level_up = num_players <= max_tier;
            self.loot = loot;
            self.phase = Some(CombatPhase::Victory);
        } else {
            self.num_alive_adventurers = 0;
            self.level_up = false;
            self.loot = Vec::new();
            self.phase = Some(CombatPhase::Defeat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skeleton() -> Enemy {
        Enemy {
            name: "Skeleton Swordsman".to_string(),
            tier: 1,
            class: Some("Undead".to_string()),
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings::default().with_players(4)
    }

    #[test]
    fn new_combat_sums_tiers() {
        let mut troll = skeleton();
        troll.tier = 4;
        let c = CombatState::new(&settings(), vec![skeleton(), troll], false).unwrap();
        assert_eq!(c.tier, 5);
        assert_eq!(c.num_alive_adventurers, 4);
        assert_eq!(c.round_count, 0);
        assert_eq!(c.surge_period, 3);
        assert_eq!(c.phase, Some(CombatPhase::DrawEnemies));
    }

    #[test]
    fn new_combat_rejects_unknown_difficulty() {
        let s = settings().with_difficulty("legendary");
        assert!(CombatState::new(&s, vec![skeleton()], false).is_err());
    }

    #[test]
    fn record_round_advances() {
        let mut c = CombatState::new(&settings(), vec![skeleton()], false).unwrap();
        let phase = c.record_round(
            Attack {
                damage: 2,
                surge: false,
            },
            vec![5, 12],
        );
        assert_eq!(phase, CombatPhase::ResolveAbilities);
        assert_eq!(c.round_count, 1);
        assert_eq!(c.most_recent_rolls, vec![5, 12]);

        let phase = c.record_round(
            Attack {
                damage: 1,
                surge: true,
            },
            vec![],
        );
        assert_eq!(phase, CombatPhase::Surge);
        assert_eq!(c.round_count, 2);
    }

    #[test]
    fn deltas_are_clamped() {
        let mut c = CombatState::new(&settings(), vec![skeleton()], false).unwrap();
        c.tier_sum_delta(-5);
        assert_eq!(c.tier, 0);
        c.tier_sum_delta(3);
        assert_eq!(c.tier, 3);

        c.adventurer_delta(4, 2);
        assert_eq!(c.num_alive_adventurers, 4);
        c.adventurer_delta(4, -10);
        assert_eq!(c.num_alive_adventurers, 0);
        c.adventurer_delta(4, 1);
        assert_eq!(c.num_alive_adventurers, 1);
    }

    #[test]
    fn victory_and_defeat() {
        let base = CombatState::new(&settings(), vec![skeleton()], false).unwrap();
        let loot = vec![LootPile { tier: 1, count: 2 }];

        let mut won = base.clone();
        won.end(true, 5, 4, loot.clone());
        assert_eq!(won.tier, 0);
        assert!(won.level_up);
        assert_eq!(won.loot, loot);
        assert_eq!(won.phase, Some(CombatPhase::Victory));

        let mut lost = base.clone();
        lost.end(false, 5, 4, loot);
        assert_eq!(lost.num_alive_adventurers, 0);
        assert!(!lost.level_up);
        assert!(lost.loot.is_empty());
        assert_eq!(lost.phase, Some(CombatPhase::Defeat));

        // The source state is untouched.
        assert_eq!(base.tier, 1);
        assert_eq!(base.num_alive_adventurers, 4);
    }

    #[test]
    fn no_level_up_below_party_size() {
        let mut c = CombatState::new(&settings(), vec![skeleton()], false).unwrap();
        c.end(true, 3, 4, Vec::new());
        assert!(!c.level_up);
    }

    #[test]
    fn phase_serializes_screaming() {
        let json = serde_json::to_string(&CombatPhase::ResolveAbilities).unwrap();
        assert_eq!(json, "\"RESOLVE_ABILITIES\"");
    }
}
