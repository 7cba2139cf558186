//! Quest minigame mechanics for Wayfarer.
//!
//! Pure, deterministic rules for the two simulation minigames a quest can
//! embed: timed combat rounds (attack generation, surge scheduling, loot) and
//! skill-check decisions (check generation, roll outcomes). Every random draw
//! goes through an explicit [`rand::rngs::StdRng`] seeded from the quest
//! context; nothing here touches a global random source.

pub mod combat;
pub mod decision;
pub mod encounter;
pub mod error;
pub mod random;
pub mod settings;

pub use combat::{Attack, CombatPhase, CombatState, Enemy, LootPile};
pub use decision::{
    DecisionPhase, DecisionState, Difficulty, LeveledSkillCheck, Outcome, Persona, Skill,
    SkillCheck,
};
pub use encounter::{Encounter, find_encounter};
pub use error::{MechError, MechResult};
pub use settings::{CombatDifficulty, SessionSettings};
