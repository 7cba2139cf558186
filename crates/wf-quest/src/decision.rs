//! Skill-check decisions on a quest cursor.
//!
//! As with combat, drawing checks (`resolve_init_decision`) is separate from
//! installing them (`apply_init_decision`) so a peer can replay the draw.

use tracing::debug;
use wf_mechanics::decision::{
    compute_outcome, find_event, generate_leveled_checks, level_checks, select_checks,
};
use wf_mechanics::random::seeded;
use wf_mechanics::{
    CombatPhase, DecisionPhase, DecisionState, LeveledSkillCheck, MechError, Outcome,
    SessionSettings, SkillCheck,
};

use crate::card::{Card, Transition};
use crate::context::PathStep;
use crate::cursor::QuestCursor;
use crate::error::{QuestError, QuestResult};

/// Attribute capping the number of rolls a decision allows.
pub const MAX_ROLLS_ATTR: &str = "maxrolls";
/// Roll cap when a decision sets none.
pub const DEFAULT_MAX_ROLLS: u32 = 999;
/// Event key of the branch taken when the party runs out of rolls.
pub const INTERRUPTED_EVENT: &str = "interrupted";

/// The result of adding one roll.
#[derive(Debug, Clone)]
pub struct RollResult {
    /// The cursor with the roll recorded.
    pub cursor: QuestCursor,
    /// Outcome so far, `None` before any roll.
    pub outcome: Option<Outcome>,
    /// `on` value of the branch that handles the outcome, if any.
    pub event: Option<String>,
}

/// Adventurers still able to roll: the fight's count in combat, otherwise
/// the whole party.
pub fn alive_adventurers(cursor: &QuestCursor, settings: &SessionSettings) -> u32 {
    cursor
        .ctx()
        .combat
        .as_ref()
        .map_or(settings.num_players, |c| c.num_alive_adventurers)
}

/// The node's `maxrolls` attribute.
pub fn max_rolls(cursor: &QuestCursor) -> u32 {
    cursor
        .element()
        .and_then(|e| e.attr(MAX_ROLLS_ATTR))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_ROLLS)
}

/// Visible `<event>` keys that name a skill check, in document order.
fn authored_checks(cursor: &QuestCursor) -> Vec<(String, SkillCheck)> {
    cursor
        .visible_event_keys()
        .into_iter()
        .filter_map(|key| SkillCheck::parse(&key).map(|check| (key, check)))
        .collect()
}

fn decision_of(cursor: &QuestCursor) -> QuestResult<&DecisionState> {
    cursor.ctx().decision.as_ref().ok_or(QuestError::NoDecision)
}

fn with_decision(
    cursor: &QuestCursor,
    f: impl FnOnce(&mut DecisionState) -> QuestResult<()>,
) -> QuestResult<QuestCursor> {
    let mut next = cursor.clone();
    let decision = next
        .ctx_mut()
        .decision
        .as_mut()
        .ok_or(QuestError::NoDecision)?;
    f(decision)?;
    Ok(next)
}

/// Draw the checks a decision offers.
///
/// Each visible event naming a skill becomes one medium check. A combat
/// without authored checks gets three random ones.
pub fn resolve_init_decision(
    cursor: &QuestCursor,
    settings: &SessionSettings,
) -> QuestResult<Vec<LeveledSkillCheck>> {
    let scale = alive_adventurers(cursor, settings).min(max_rolls(cursor));
    let mut rng = seeded(cursor.ctx().seed);
    let authored: Vec<SkillCheck> = authored_checks(cursor)
        .into_iter()
        .map(|(_, check)| check)
        .collect();
    let mut checks = level_checks(&authored, scale, &mut rng);
    if checks.is_empty() && cursor.in_combat() {
        checks = generate_leveled_checks(scale, &mut rng);
    }
    if checks.is_empty() {
        return Err(MechError::NoSkillChecks.into());
    }
    Ok(checks)
}

/// Install drawn checks and show the prepare card.
pub fn apply_init_decision(
    cursor: &QuestCursor,
    checks: Vec<LeveledSkillCheck>,
) -> QuestResult<Transition> {
    let mut next = cursor.clone();
    debug!(checks = checks.len(), "decision started");
    next.ctx_mut().decision = Some(DecisionState::new(checks)?);
    next.ctx_mut().advance_seed();
    to_decision_card(&next, DecisionPhase::Prepare)
}

/// Start the decision at the cursor.
pub fn init_decision(cursor: &QuestCursor, settings: &SessionSettings) -> QuestResult<Transition> {
    let checks = resolve_init_decision(cursor, settings)?;
    apply_init_decision(cursor, checks)
}

/// The (at most three) checks shown to the party.
///
/// Drawn from the current seed without advancing it, so every peer shows the
/// same choices.
pub fn select_offered_checks(cursor: &QuestCursor) -> QuestResult<Vec<LeveledSkillCheck>> {
    let decision = decision_of(cursor)?;
    Ok(select_checks(
        &decision.leveled_checks,
        &mut seeded(cursor.ctx().seed),
    ))
}

/// Choose the check to roll for. Rolls already made are kept.
pub fn handle_decision_select(
    cursor: &QuestCursor,
    selected: LeveledSkillCheck,
) -> QuestResult<Transition> {
    let next = with_decision(cursor, |d| {
        d.selected = Some(selected);
        Ok(())
    })?;
    debug!(%selected, "check selected");
    to_decision_card(&next, DecisionPhase::Rolling)
}

/// Add a roll and work out which branch, if any, handles the outcome.
pub fn push_decision_roll(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    roll: u32,
) -> QuestResult<RollResult> {
    let selected = decision_of(cursor)?
        .selected
        .ok_or(QuestError::NoSelectedCheck)?;
    let next = with_decision(cursor, |d| Ok(d.push_roll(roll)?))?;

    // Only a bare `interrupted` branch holds the party back once everyone
    // has rolled; a persona or skill specific one does not.
    let has_interrupted = cursor.in_combat()
        || cursor
            .visible_event_keys()
            .iter()
            .any(|k| k.trim().eq_ignore_ascii_case(INTERRUPTED_EVENT));
    let candidates = authored_checks(cursor);
    let rolls = decision_of(&next)?.rolls.as_slice();
    let outcome = compute_outcome(
        rolls,
        &selected,
        alive_adventurers(cursor, settings),
        max_rolls(cursor),
        has_interrupted,
    );
    let event = outcome
        .filter(|o| *o != Outcome::Retry)
        .and_then(|o| find_event(candidates, o, &selected));
    debug!(roll, ?outcome, ?event, "decision roll");
    Ok(RollResult {
        cursor: next,
        outcome,
        event,
    })
}

/// Add a roll and move on.
///
/// Outside combat a handling branch is entered straight away. Inside combat,
/// or when no branch handles the outcome, the result card is shown.
pub fn handle_decision_roll(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    roll: u32,
) -> QuestResult<Transition> {
    let result = push_decision_roll(cursor, settings, roll)?;
    if result.cursor.in_combat() {
        return to_decision_card(&result.cursor, DecisionPhase::Resolve);
    }
    let followed = result
        .event
        .as_ref()
        .and_then(|on| result.cursor.next(PathStep::Event(on.clone())));
    match followed {
        Some(mut next) => {
            next.ctx_mut().decision = None;
            Ok(Transition::enter(next))
        }
        None => to_decision_card(&result.cursor, DecisionPhase::Resolve),
    }
}

/// Show the decision in `phase`. Inside a fight this is the combat's
/// mid-combat decision card.
pub fn to_decision_card(cursor: &QuestCursor, phase: DecisionPhase) -> QuestResult<Transition> {
    let mut next = with_decision(cursor, |d| {
        d.phase = Some(phase);
        Ok(())
    })?;
    if next.in_combat() {
        if let Some(combat) = next.ctx_mut().combat.as_mut() {
            combat.phase = Some(CombatPhase::MidCombatDecision);
        }
        return Ok(Transition::new(next, Card::combat(CombatPhase::MidCombatDecision)));
    }
    Ok(Transition::new(next, Card::decision(phase)))
}

/// Time allowed for a roll.
pub fn skill_time_millis(settings: &SessionSettings) -> u64 {
    settings.round_time_millis()
}
