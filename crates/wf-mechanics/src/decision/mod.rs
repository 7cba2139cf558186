//! Skill-check decisions.
//!
//! A decision offers the party a few skill checks. The party picks one and
//! rolls d20s against its difficulty until the check succeeds, fails, or is
//! interrupted. Authored `<event on="...">` branches name the check they
//! belong to, e.g. `light athletics`, `dark:knowledge failure` or plain
//! `success`.

pub mod select;

pub use select::{
    MAX_REQUIRED_SUCCESSES, MIN_REQUIRED_SUCCESSES, generate_leveled_checks,
    generate_required_successes, level_checks, select_checks,
};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MechError, MechResult};
use crate::random::D20;

/// Attitude an adventurer takes on a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// Heroic approach.
    Light,
    /// Ruthless approach.
    Dark,
}

/// Skill tested by a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    /// Physical feats.
    Athletics,
    /// Lore and reasoning.
    Knowledge,
    /// Persuasion and presence.
    Charisma,
}

/// Result of a check after a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Enough rolls met the success threshold.
    Success,
    /// A roll fell below the retry threshold.
    Failure,
    /// Neither yet; roll again.
    Retry,
    /// The party ran out of rolls.
    Interrupted,
}

/// Check difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Succeeds on 8+, fails under 2.
    Easy,
    /// Succeeds on 12+, fails under 4.
    #[default]
    Medium,
    /// Succeeds on 16+, fails under 6.
    Hard,
}

impl Persona {
    /// All personas.
    pub const ALL: [Persona; 2] = [Persona::Light, Persona::Dark];

    fn parse(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.to_string() == word)
    }
}

impl Skill {
    /// All skills.
    pub const ALL: [Skill; 3] = [Skill::Athletics, Skill::Knowledge, Skill::Charisma];

    fn parse(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.to_string() == word)
    }
}

impl Outcome {
    const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::Failure,
        Outcome::Retry,
        Outcome::Interrupted,
    ];

    fn parse(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.to_string() == word)
    }
}

impl Difficulty {
    /// All difficulties.
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Lowest roll that counts as a success.
    pub fn success_threshold(self) -> u32 {
        match self {
            Difficulty::Easy => 8,
            Difficulty::Medium => 12,
            Difficulty::Hard => 16,
        }
    }

    /// Rolls below this fail the check outright.
    pub fn retry_threshold(self) -> u32 {
        match self {
            Difficulty::Easy => 2,
            Difficulty::Medium => 4,
            Difficulty::Hard => 6,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persona::Light => write!(f, "light"),
            Persona::Dark => write!(f, "dark"),
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skill::Athletics => write!(f, "athletics"),
            Skill::Knowledge => write!(f, "knowledge"),
            Skill::Charisma => write!(f, "charisma"),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
            Outcome::Retry => write!(f, "retry"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// A check as named by an event's `on` attribute. Every part is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkillCheck {
    /// Required persona.
    pub persona: Option<Persona>,
    /// Required skill.
    pub skill: Option<Skill>,
    /// Outcome the branch handles (success when absent).
    pub outcome: Option<Outcome>,
}

impl SkillCheck {
    /// Parse an `on` value such as `"dark athletics failure"`.
    ///
    /// Words may be separated by whitespace, `:` or `,` and are matched
    /// case-insensitively. Returns `None` when the text is empty or contains
    /// a word that is not a persona, skill or outcome (e.g. `win`, `round`).
    pub fn parse(text: &str) -> Option<Self> {
        let mut check = SkillCheck::default();
        let mut any = false;
        for word in text
            .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
            .filter(|w| !w.is_empty())
        {
            let word = word.to_ascii_lowercase();
            if let Some(p) = Persona::parse(&word) {
                check.persona = Some(p);
            } else if let Some(s) = Skill::parse(&word) {
                check.skill = Some(s);
            } else if let Some(o) = Outcome::parse(&word) {
                check.outcome = Some(o);
            } else {
                return None;
            }
            any = true;
        }
        any.then_some(check)
    }

    /// Whether an event naming this check handles `outcome` for `selected`.
    pub fn handles(&self, outcome: Outcome, selected: &LeveledSkillCheck) -> bool {
        if self.outcome.unwrap_or(Outcome::Success) != outcome {
            return false;
        }
        if self.persona.is_some() && self.persona != selected.persona {
            return false;
        }
        if self.skill.is_some_and(|s| s != selected.skill) {
            return false;
        }
        true
    }
}

/// Pick the event branch that best handles `outcome`.
///
/// Candidates are `(key, check)` pairs in document order. A candidate that
/// names a skill or persona is never displaced by a later, less specific one.
pub fn find_event<K>(
    events: impl IntoIterator<Item = (K, SkillCheck)>,
    outcome: Outcome,
    selected: &LeveledSkillCheck,
) -> Option<K> {
    let mut best: Option<(K, SkillCheck)> = None;
    for (key, check) in events {
        if !check.handles(outcome, selected) {
            continue;
        }
        if let Some((_, current)) = &best {
            if current.skill.is_some() && check.skill.is_none() {
                continue;
            }
            if current.persona.is_some() && check.persona.is_none() {
                continue;
            }
        }
        best = Some((key, check));
    }
    best.map(|(key, _)| key)
}

/// A check offered to the party, with its difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeveledSkillCheck {
    /// Persona, if the check requires one.
    pub persona: Option<Persona>,
    /// Skill tested.
    pub skill: Skill,
    /// Difficulty of each roll.
    pub difficulty: Difficulty,
    /// Successes needed to pass (1-3).
    pub required_successes: u32,
}

impl fmt::Display for LeveledSkillCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = self.persona {
            write!(f, "{p} ")?;
        }
        write!(
            f,
            "{} ({}, {} needed)",
            self.skill, self.difficulty, self.required_successes
        )
    }
}

/// Card phases of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionPhase {
    /// Choosing a check.
    Prepare,
    /// Rolling for the selected check.
    Rolling,
    /// Showing the result.
    Resolve,
}

/// Simulation state of one decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionState {
    /// Checks the party may choose from.
    pub leveled_checks: Vec<LeveledSkillCheck>,
    /// The chosen check.
    pub selected: Option<LeveledSkillCheck>,
    /// Rolls made so far.
    pub rolls: Vec<u32>,
    /// Current card phase.
    pub phase: Option<DecisionPhase>,
}

impl DecisionState {
    /// Start a decision offering `checks`. At least one check is required.
    pub fn new(leveled_checks: Vec<LeveledSkillCheck>) -> MechResult<Self> {
        if leveled_checks.is_empty() {
            return Err(MechError::NoSkillChecks);
        }
        Ok(Self {
            leveled_checks,
            ..Self::default()
        })
    }

    /// Add a roll. Values outside 1-20 are rejected.
    pub fn push_roll(&mut self, roll: u32) -> MechResult<()> {
        if !(1..=D20).contains(&roll) {
            return Err(MechError::InvalidRoll(roll));
        }
        self.rolls.push(roll);
        Ok(())
    }
}

/// Number of rolls meeting the selected check's success threshold.
pub fn compute_successes(rolls: &[u32], selected: &LeveledSkillCheck) -> usize {
    let threshold = selected.difficulty.success_threshold();
    rolls.iter().filter(|&&r| r >= threshold).count()
}

/// Outcome of the rolls made so far, or `None` before the first roll.
///
/// A check succeeds with enough successes, or when every adventurer has rolled
/// and the node has no `interrupted` branch. Otherwise any roll under the
/// retry threshold fails it, and running out of rolls interrupts it.
pub fn compute_outcome(
    rolls: &[u32],
    selected: &LeveledSkillCheck,
    alive_adventurers: u32,
    max_rolls: u32,
    has_interrupted: bool,
) -> Option<Outcome> {
    if rolls.is_empty() {
        return None;
    }
    let made = rolls.len();
    let alive = alive_adventurers as usize;
    let successes = compute_successes(rolls, selected);
    let retry_threshold = selected.difficulty.retry_threshold();
    let failures = rolls.iter().filter(|&&r| r < retry_threshold).count();

    let outcome = if successes >= selected.required_successes as usize
        || (made >= alive && !has_interrupted)
    {
        Outcome::Success
    } else if failures > 0 {
        Outcome::Failure
    } else if made >= alive || (max_rolls > 0 && made >= max_rolls as usize) {
        Outcome::Interrupted
    } else {
        Outcome::Retry
    };
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(required: u32) -> LeveledSkillCheck {
        LeveledSkillCheck {
            persona: Some(Persona::Light),
            skill: Skill::Athletics,
            difficulty: Difficulty::Medium,
            required_successes: required,
        }
    }

    #[test]
    fn parse_checks() {
        assert_eq!(
            SkillCheck::parse("Light Athletics"),
            Some(SkillCheck {
                persona: Some(Persona::Light),
                skill: Some(Skill::Athletics),
                outcome: None,
            })
        );
        assert_eq!(
            SkillCheck::parse("dark:knowledge, failure"),
            Some(SkillCheck {
                persona: Some(Persona::Dark),
                skill: Some(Skill::Knowledge),
                outcome: Some(Outcome::Failure),
            })
        );
        assert_eq!(
            SkillCheck::parse("success").and_then(|c| c.outcome),
            Some(Outcome::Success)
        );
        assert_eq!(SkillCheck::parse("win"), None);
        assert_eq!(SkillCheck::parse("light round"), None);
        assert_eq!(SkillCheck::parse("  "), None);
    }

    #[test]
    fn thresholds() {
        assert_eq!(Difficulty::Easy.success_threshold(), 8);
        assert_eq!(Difficulty::Hard.retry_threshold(), 6);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }

    #[test]
    fn empty_decision_is_error() {
        assert_eq!(DecisionState::new(Vec::new()), Err(MechError::NoSkillChecks));
        let d = DecisionState::new(vec![check(1)]).unwrap();
        assert!(d.rolls.is_empty());
        assert!(d.selected.is_none());
    }

    #[test]
    fn rolls_validated() {
        let mut d = DecisionState::new(vec![check(1)]).unwrap();
        assert!(d.push_roll(20).is_ok());
        assert_eq!(d.push_roll(0), Err(MechError::InvalidRoll(0)));
        assert_eq!(d.push_roll(21), Err(MechError::InvalidRoll(21)));
        assert_eq!(d.rolls, vec![20]);
    }

    #[test]
    fn successes_counted() {
        assert_eq!(compute_successes(&[12, 11, 20, 3], &check(1)), 2);
    }

    #[test]
    fn no_rolls_no_outcome() {
        assert_eq!(compute_outcome(&[], &check(1), 3, 999, false), None);
    }

    #[test]
    fn success_when_required_met() {
        assert_eq!(
            compute_outcome(&[15], &check(1), 3, 999, false),
            Some(Outcome::Success)
        );
    }

    #[test]
    fn failure_below_retry_threshold() {
        assert_eq!(
            compute_outcome(&[2], &check(1), 3, 999, false),
            Some(Outcome::Failure)
        );
    }

    #[test]
    fn retry_in_between() {
        assert_eq!(
            compute_outcome(&[8], &check(1), 3, 999, false),
            Some(Outcome::Retry)
        );
        assert_eq!(
            compute_outcome(&[14, 8], &check(2), 3, 999, true),
            Some(Outcome::Retry)
        );
    }

    #[test]
    fn out_of_rolls() {
        // Without an interrupted branch, the last roll passes the check.
        assert_eq!(
            compute_outcome(&[8, 9], &check(1), 2, 999, false),
            Some(Outcome::Success)
        );
        assert_eq!(
            compute_outcome(&[8, 9], &check(1), 2, 999, true),
            Some(Outcome::Interrupted)
        );
        assert_eq!(
            compute_outcome(&[8], &check(1), 4, 1, true),
            Some(Outcome::Interrupted)
        );
    }

    #[test]
    fn most_specific_event_wins() {
        let selected = check(1);
        let events = [
            ("generic", SkillCheck::parse("success").unwrap()),
            ("light athletics", SkillCheck::parse("light athletics").unwrap()),
            ("dark knowledge", SkillCheck::parse("dark knowledge").unwrap()),
            ("athletics", SkillCheck::parse("athletics").unwrap()),
        ];
        assert_eq!(
            find_event(events, Outcome::Success, &selected),
            Some("light athletics")
        );
    }

    #[test]
    fn event_outcome_must_match() {
        let selected = check(1);
        let events = [
            ("win", SkillCheck::parse("light athletics").unwrap()),
            ("lose", SkillCheck::parse("failure").unwrap()),
        ];
        assert_eq!(find_event(events, Outcome::Failure, &selected), Some("lose"));
        assert_eq!(find_event(events, Outcome::Interrupted, &selected), None);
    }

    #[test]
    fn display_check() {
        assert_eq!(check(2).to_string(), "light athletics (medium, 2 needed)");
    }
}
