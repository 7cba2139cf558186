//! Generating and narrowing the checks a decision offers.

use rand::Rng;
use rand::rngs::StdRng;

use super::{Difficulty, LeveledSkillCheck, Persona, Skill, SkillCheck};
use crate::random::choose;

/// Fewest successes a check may require.
pub const MIN_REQUIRED_SUCCESSES: u32 = 1;
/// Most successes a check may require.
pub const MAX_REQUIRED_SUCCESSES: u32 = 3;
/// Most checks shown to the party at once.
pub const MAX_SHOWN_CHECKS: usize = 3;

/// Draw a required-success count scaled by `max_required`, kept within 1-3.
pub fn generate_required_successes(max_required: u32, rng: &mut StdRng) -> u32 {
    let r: f64 = rng.random();
    let drawn = (r * f64::from(max_required)).floor() as u32;
    drawn.clamp(MIN_REQUIRED_SUCCESSES, MAX_REQUIRED_SUCCESSES)
}

/// Turn authored checks into offered checks.
///
/// Checks without a skill are skipped. Every offered check is medium
/// difficulty with a drawn required-success count.
pub fn level_checks(
    checks: &[SkillCheck],
    max_required: u32,
    rng: &mut StdRng,
) -> Vec<LeveledSkillCheck> {
    checks
        .iter()
        .filter_map(|c| c.skill.map(|skill| (c.persona, skill)))
        .map(|(persona, skill)| LeveledSkillCheck {
            persona,
            skill,
            difficulty: Difficulty::Medium,
            required_successes: generate_required_successes(max_required, rng),
        })
        .collect()
}

/// Three distinct random checks, for decisions without authored branches.
pub fn generate_leveled_checks(max_required: u32, rng: &mut StdRng) -> Vec<LeveledSkillCheck> {
    let mut results: Vec<LeveledSkillCheck> = Vec::with_capacity(MAX_SHOWN_CHECKS);
    while results.len() < MAX_SHOWN_CHECKS {
        let persona = choose(&Persona::ALL, rng).copied();
        let skill = choose(&Skill::ALL, rng).copied().unwrap_or(Skill::Athletics);
        let difficulty = choose(&Difficulty::ALL, rng).copied().unwrap_or_default();
        let required_successes = generate_required_successes(max_required, rng);

        let duplicate = results
            .iter()
            .any(|r| r.persona == persona && r.skill == skill && r.difficulty == difficulty);
        if !duplicate {
            results.push(LeveledSkillCheck {
                persona,
                skill,
                difficulty,
                required_successes,
            });
        }
    }
    results
}

/// Narrow `checks` to at most three choices.
///
/// Checks are grouped by persona and skill. With more than three groups,
/// three are sampled without replacement; then one check is picked from each
/// remaining group.
pub fn select_checks(checks: &[LeveledSkillCheck], rng: &mut StdRng) -> Vec<LeveledSkillCheck> {
    let mut groups: Vec<((Option<Persona>, Skill), Vec<LeveledSkillCheck>)> = Vec::new();
    for check in checks {
        let key = (check.persona, check.skill);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(*check),
            None => groups.push((key, vec![*check])),
        }
    }

    if groups.len() > MAX_SHOWN_CHECKS {
        // Partial Fisher-Yates: the sampled groups end up at the tail.
        let min = groups.len() - MAX_SHOWN_CHECKS;
        let mut i = groups.len();
        while i > min {
            i -= 1;
            let r: f64 = rng.random();
            let index = ((i + 1) as f64 * r).floor() as usize;
            groups.swap(index.min(i), i);
        }
        groups.drain(..min);
    }

    groups
        .iter()
        .filter_map(|(_, group)| choose(group, rng).copied())
        .collect()
}
