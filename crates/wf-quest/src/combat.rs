//! Combat operations on a quest cursor.
//!
//! Every operation that draws random numbers is split in two: `resolve_*`
//! draws from the context seed without changing anything, and `apply_*`
//! performs the transition from already-drawn values and advances the seed.
//! The `handle_*` functions run both, for local single-peer play.

use std::sync::Arc;

use tracing::debug;
use wf_core::{Document, ElementKind, NodeId};
use wf_mechanics::combat::{generate_attack, generate_loot, generate_rolls};
use wf_mechanics::random::seeded;
use wf_mechanics::{
    Attack, CombatPhase, CombatState, Enemy, LootPile, SessionSettings, find_encounter,
};

use crate::card::{Card, CardName, Transition};
use crate::context::{PathStep, TemplateContext};
use crate::cursor::{ON_ATTR, QuestCursor, Trigger};
use crate::error::{QuestError, QuestResult};

/// Event played between rounds.
pub const ROUND_EVENT: &str = "round";
/// Event taken after a won fight.
pub const WIN_EVENT: &str = "win";
/// Event taken after a lost fight.
pub const LOSE_EVENT: &str = "lose";
/// Tier assumed for an unknown enemy without a `tier` attribute.
const DEFAULT_ENEMY_TIER: u32 = 1;

/// Enemies listed by the visible `<e>` children of a combat node.
///
/// Known names take their tier and class from the encounter table; anything
/// else uses the `tier` attribute.
pub fn enemies(cursor: &QuestCursor) -> Vec<Enemy> {
    cursor
        .children_with_visibility()
        .filter(|c| c.kind() == &ElementKind::Enemy)
        .map(|e| {
            let name = e.text().trim().to_string();
            match find_encounter(&name) {
                Some(known) => Enemy {
                    name: known.name.to_string(),
                    tier: known.tier,
                    class: Some(known.class.to_string()),
                },
                None => Enemy {
                    tier: e
                        .attr("tier")
                        .and_then(|t| t.trim().parse().ok())
                        .unwrap_or(DEFAULT_ENEMY_TIER),
                    name,
                    class: None,
                },
            }
        })
        .collect()
}

/// Start the fight at the cursor's combat node.
pub fn init_combat(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    custom: bool,
) -> QuestResult<Transition> {
    let state = CombatState::new(settings, enemies(cursor), custom)?;
    debug!(tier = state.tier, enemies = state.enemies.len(), custom, "combat started");
    let mut next = cursor.clone();
    let ctx = next.ctx_mut();
    ctx.combat = Some(state);
    ctx.decision = None;
    Ok(Transition::new(next, Card::combat(CombatPhase::DrawEnemies)))
}

/// Start a fight outside of any quest, against enemies tracked by hand.
pub fn init_custom_combat(settings: &SessionSettings, seed: u64) -> QuestResult<Transition> {
    let mut document = Document::new();
    let root = document.add_element(None, "combat", Vec::new());
    let cursor = QuestCursor::new(Arc::new(document), root, TemplateContext::new(seed))?;
    init_combat(&cursor, settings, true)
}

fn combat_of(cursor: &QuestCursor) -> QuestResult<&CombatState> {
    cursor.ctx().combat.as_ref().ok_or(QuestError::NoCombat)
}

fn with_combat(
    cursor: &QuestCursor,
    f: impl FnOnce(&mut CombatState),
) -> QuestResult<QuestCursor> {
    let mut next = cursor.clone();
    let combat = next.ctx_mut().combat.as_mut().ok_or(QuestError::NoCombat)?;
    f(combat);
    Ok(next)
}

fn set_phase(cursor: &QuestCursor, phase: CombatPhase) -> QuestResult<Transition> {
    let next = with_combat(cursor, |c| c.phase = Some(phase))?;
    Ok(Transition::new(next, Card::combat(phase)))
}

/// Draw the enemies' attack and the party's rolls for the round that just
/// ended.
pub fn resolve_timer_stop(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    elapsed_millis: u64,
) -> QuestResult<(Attack, Vec<u32>)> {
    let combat = combat_of(cursor)?;
    let mut rng = seeded(cursor.ctx().seed);
    let attack = generate_attack(combat, settings, elapsed_millis, &mut rng);
    let rolls = generate_rolls(settings.num_players, &mut rng);
    Ok((attack, rolls))
}

/// Record a finished round from drawn values.
pub fn apply_timer_stop(
    cursor: &QuestCursor,
    attack: Attack,
    rolls: Vec<u32>,
) -> QuestResult<Transition> {
    let mut next = cursor.clone();
    let phase = next
        .ctx_mut()
        .combat
        .as_mut()
        .ok_or(QuestError::NoCombat)?
        .record_round(attack, rolls);
    next.ctx_mut().advance_seed();
    debug!(?phase, damage = attack.damage, "round recorded");
    if phase == CombatPhase::Surge {
        Ok(Transition::new(next, Card::combat(phase)))
    } else {
        handle_resolve_phase(&next)
    }
}

/// Stop the round timer: draw, record, and move on.
pub fn handle_combat_timer_stop(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    elapsed_millis: u64,
) -> QuestResult<Transition> {
    let (attack, rolls) = resolve_timer_stop(cursor, settings, elapsed_millis)?;
    apply_timer_stop(cursor, attack, rolls)
}

/// Between rounds: play a visible `round` event if there is one, otherwise
/// go on to resolving abilities.
pub fn handle_resolve_phase(cursor: &QuestCursor) -> QuestResult<Transition> {
    combat_of(cursor)?;
    let has_round = cursor.visible_event_keys().iter().any(|k| k == ROUND_EVENT);
    let roleplay = has_round
        .then(|| cursor.next(PathStep::Event(ROUND_EVENT.to_string())))
        .flatten();
    match roleplay {
        Some(roleplay) => enter_roleplay(cursor, &roleplay),
        None => set_phase(cursor, CombatPhase::ResolveAbilities),
    }
}

/// Show `roleplay` as the combat's interlude. The combat cursor stays put and
/// takes over the scope the roleplay card produced.
fn enter_roleplay(combat: &QuestCursor, roleplay: &QuestCursor) -> QuestResult<Transition> {
    let node = roleplay.node();
    let mut next = with_combat(combat, |c| {
        c.roleplay = Some(node);
        c.phase = Some(CombatPhase::Roleplay);
    })?;
    next.ctx_mut().scope = roleplay.ctx().scope.clone();
    Ok(Transition::new(next, Card::combat(CombatPhase::Roleplay)))
}

fn leave_roleplay(cursor: &QuestCursor) -> QuestResult<Transition> {
    let next = with_combat(cursor, |c| {
        c.roleplay = None;
        c.phase = Some(CombatPhase::ResolveAbilities);
    })?;
    Ok(Transition::new(next, Card::combat(CombatPhase::ResolveAbilities)))
}

/// Take choice `index` on the roleplay shown mid-combat.
///
/// `end` finishes the quest. A `win`/`lose` event reached through a trigger
/// leaves the fight for that branch. A roleplay inside the fight becomes the
/// next interlude; anything else goes back to resolving abilities.
pub fn mid_combat_choice(cursor: &QuestCursor, index: usize) -> QuestResult<Transition> {
    let combat = combat_of(cursor)?;
    let Some(roleplay) = combat.roleplay else {
        return leave_roleplay(cursor);
    };
    let combat_node = cursor.node();
    let Some(mut landed) = cursor.at(roleplay).next(PathStep::Choice(index)) else {
        return leave_roleplay(cursor);
    };

    match landed.trigger() {
        Some(Trigger::End) => {
            return Ok(Transition::new(landed, Card::new(CardName::QuestEnd)));
        }
        Some(Trigger::Event(name)) => {
            let Some(handled) = landed.handle_trigger_event() else {
                return leave_roleplay(cursor);
            };
            if is_outcome_event(&handled) {
                return Ok(exit_combat(cursor, &handled, name));
            }
            landed = handled;
        }
        Some(Trigger::Goto(_)) | None => {}
    }

    let inside = landed
        .element()
        .is_some_and(|e| e.kind() == &ElementKind::Roleplay && e.is_within(combat_node));
    if inside {
        enter_roleplay(cursor, &landed)
    } else {
        debug!(node = %landed.node(), "mid-combat choice left the fight's roleplay");
        leave_roleplay(cursor)
    }
}

fn is_outcome_event(cursor: &QuestCursor) -> bool {
    cursor
        .element()
        .and_then(|e| e.parent())
        .filter(|p| p.kind() == &ElementKind::Event)
        .and_then(|p| p.attr(ON_ATTR))
        .is_some_and(|on| on == WIN_EVENT || on == LOSE_EVENT)
}

/// Leave the fight for an outcome branch. The path records the branch as an
/// event taken from the combat node.
fn exit_combat(combat: &QuestCursor, landed: &QuestCursor, event: String) -> Transition {
    let mut next = landed.clone();
    let ctx = next.ctx_mut();
    ctx.path = combat.ctx().path.clone();
    ctx.path.push(PathStep::Event(event));
    ctx.combat = None;
    ctx.decision = None;
    debug!(node = %next.node(), "left combat");
    Transition::enter(next)
}

/// Draw the loot for a finished fight. Defeats award nothing.
pub fn resolve_combat_end(
    cursor: &QuestCursor,
    victory: bool,
    max_tier: u32,
) -> QuestResult<Vec<LootPile>> {
    combat_of(cursor)?;
    if !victory {
        return Ok(Vec::new());
    }
    Ok(generate_loot(max_tier, &mut seeded(cursor.ctx().seed)))
}

/// Finish the fight with already-drawn loot.
pub fn apply_combat_end(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    victory: bool,
    max_tier: u32,
    loot: Vec<LootPile>,
) -> QuestResult<Transition> {
    let mut next = with_combat(cursor, |c| c.end(victory, max_tier, settings.num_players, loot))?;
    next.ctx_mut().advance_seed();
    let phase = if victory {
        CombatPhase::Victory
    } else {
        CombatPhase::Defeat
    };
    debug!(victory, max_tier, "combat ended");
    Ok(Transition::new(next, Card::combat(phase)))
}

/// Finish the fight.
pub fn handle_combat_end(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    victory: bool,
    max_tier: u32,
) -> QuestResult<Transition> {
    let loot = resolve_combat_end(cursor, victory, max_tier)?;
    apply_combat_end(cursor, settings, victory, max_tier, loot)
}

/// Adjust the remaining enemy tier.
pub fn tier_sum_delta(cursor: &QuestCursor, delta: i64) -> QuestResult<QuestCursor> {
    with_combat(cursor, |c| c.tier_sum_delta(delta))
}

/// Adjust the number of standing adventurers.
pub fn adventurer_delta(
    cursor: &QuestCursor,
    settings: &SessionSettings,
    delta: i64,
) -> QuestResult<QuestCursor> {
    with_combat(cursor, |c| c.adventurer_delta(settings.num_players, delta))
}

/// The roleplay node shown mid-combat, if any.
pub fn combat_roleplay(cursor: &QuestCursor) -> Option<NodeId> {
    cursor.ctx().combat.as_ref().and_then(|c| c.roleplay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardPhase;

    const QUEST: &str = r#"<quest>
        <combat title="Ambush">
            <e>Skeleton Swordsman</e>
            <e tier="3">Shade</e>
            <e if="false">Troll</e>
            <event on="round" if="_.round == 1">
                <roleplay title="Taunt">
                    <p>{{ taunted = true }}</p>
                    <choice text="Again"><roleplay title="Again">again</roleplay></choice>
                    <choice text="Run"><trigger>lose</trigger></choice>
                    <choice text="Stop"><trigger>end</trigger></choice>
                    <choice text="Away"><trigger>goto camp</trigger></choice>
                </roleplay>
            </event>
            <event on="win"><roleplay title="Won">won</roleplay></event>
            <event on="lose"><roleplay title="Fled">fled</roleplay></event>
        </combat>
        <roleplay id="camp" title="Camp">camp</roleplay>
    </quest>"#;

    fn settings() -> SessionSettings {
        SessionSettings::default().with_players(4)
    }

    fn combat() -> QuestCursor {
        let doc = Arc::new(Document::parse(QUEST).unwrap());
        QuestCursor::start(doc, 99).unwrap()
    }

    fn in_roleplay() -> Transition {
        let started = init_combat(&combat(), &settings(), false).unwrap();
        let attack = Attack {
            damage: 2,
            surge: false,
        };
        apply_timer_stop(&started.cursor, attack, vec![5, 6, 7, 8]).unwrap()
    }

    #[test]
    fn init_reads_enemies() {
        let t = init_combat(&combat(), &settings(), false).unwrap();
        let state = t.cursor.ctx().combat.as_ref().unwrap();
        assert_eq!(state.enemies.len(), 2);
        assert_eq!(state.enemies[0].class.as_deref(), Some("Undead"));
        assert_eq!(state.enemies[1].tier, 3);
        assert_eq!(state.tier, 4);
        assert_eq!(state.num_alive_adventurers, 4);
        assert_eq!(t.card, Card::combat(CombatPhase::DrawEnemies));
        assert_eq!(t.cursor.ctx().seed, 99);
    }

    #[test]
    fn unknown_difficulty_is_fatal() {
        let s = settings().with_difficulty("brutal");
        assert!(init_combat(&combat(), &s, false).is_err());
    }

    #[test]
    fn custom_combat_has_no_enemies() {
        let t = init_custom_combat(&settings(), 3).unwrap();
        let state = t.cursor.ctx().combat.as_ref().unwrap();
        assert!(state.custom);
        assert_eq!(state.tier, 0);
    }

    #[test]
    fn timer_stop_is_deterministic_and_advances_seed() {
        let started = init_combat(&combat(), &settings(), false).unwrap();
        let a = resolve_timer_stop(&started.cursor, &settings(), 1000).unwrap();
        let b = resolve_timer_stop(&started.cursor, &settings(), 1000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.1.len(), 4);

        let t = handle_combat_timer_stop(&started.cursor, &settings(), 1000).unwrap();
        assert_ne!(t.cursor.ctx().seed, started.cursor.ctx().seed);
        assert_eq!(t.cursor.ctx().combat.as_ref().unwrap().round_count, 1);
        assert_eq!(started.cursor.ctx().combat.as_ref().unwrap().round_count, 0);
    }

    #[test]
    fn surge_shows_surge() {
        let started = init_combat(&combat(), &settings(), false).unwrap();
        let attack = Attack {
            damage: 1,
            surge: true,
        };
        let t = apply_timer_stop(&started.cursor, attack, vec![1]).unwrap();
        assert_eq!(t.card, Card::combat(CombatPhase::Surge));
    }

    #[test]
    fn round_event_starts_roleplay() {
        let t = in_roleplay();
        assert_eq!(t.card.phase, Some(CardPhase::Combat(CombatPhase::Roleplay)));
        assert!(t.cursor.is(&ElementKind::Combat));
        let rp = combat_roleplay(&t.cursor).unwrap();
        let doc = t.cursor.document();
        assert_eq!(doc.element(rp).unwrap().attr("title"), Some("Taunt"));
        assert!(t.cursor.ctx().lookup("taunted").is_some());

        // The round event is only visible in round 1.
        let again = apply_timer_stop(&t.cursor, Attack { damage: 0, surge: false }, vec![]).unwrap();
        assert_eq!(again.card, Card::combat(CombatPhase::ResolveAbilities));
    }

    #[test]
    fn mid_combat_choices() {
        let t = in_roleplay();

        let again = mid_combat_choice(&t.cursor, 0).unwrap();
        assert_eq!(again.card, Card::combat(CombatPhase::Roleplay));
        let rp = combat_roleplay(&again.cursor).unwrap();
        assert_eq!(again.cursor.document().element(rp).unwrap().attr("title"), Some("Again"));

        let fled = mid_combat_choice(&t.cursor, 1).unwrap();
        assert_eq!(fled.card, Card::new(CardName::QuestCard));
        assert_eq!(fled.cursor.element().unwrap().attr("title"), Some("Fled"));
        assert!(fled.cursor.ctx().combat.is_none());
        assert_eq!(fled.cursor.ctx().path, vec![PathStep::Event("lose".into())]);

        let end = mid_combat_choice(&t.cursor, 2).unwrap();
        assert_eq!(end.card, Card::new(CardName::QuestEnd));

        let away = mid_combat_choice(&t.cursor, 3).unwrap();
        assert_eq!(away.card, Card::combat(CombatPhase::ResolveAbilities));
        assert!(combat_roleplay(&away.cursor).is_none());
    }

    #[test]
    fn victory_and_defeat() {
        let started = init_combat(&combat(), &settings(), false).unwrap();
        let won = handle_combat_end(&started.cursor, &settings(), true, 8).unwrap();
        let state = won.cursor.ctx().combat.as_ref().unwrap();
        assert_eq!(state.tier, 0);
        assert!(state.level_up);
        assert_eq!(state.loot.iter().map(|p| p.tier * p.count).sum::<u32>(), 5);
        assert_eq!(won.card, Card::combat(CombatPhase::Victory));

        let lost = handle_combat_end(&started.cursor, &settings(), false, 8).unwrap();
        let state = lost.cursor.ctx().combat.as_ref().unwrap();
        assert_eq!(state.num_alive_adventurers, 0);
        assert!(state.loot.is_empty());
        assert!(!state.level_up);
        assert_eq!(lost.card, Card::combat(CombatPhase::Defeat));
    }

    #[test]
    fn deltas_clamp() {
        let started = init_combat(&combat(), &settings(), false).unwrap();
        let c = tier_sum_delta(&started.cursor, -10).unwrap();
        assert_eq!(c.ctx().combat.as_ref().unwrap().tier, 0);
        let c = adventurer_delta(&started.cursor, &settings(), 3).unwrap();
        assert_eq!(c.ctx().combat.as_ref().unwrap().num_alive_adventurers, 4);
        assert!(matches!(
            tier_sum_delta(&combat(), 1),
            Err(QuestError::NoCombat)
        ));
    }
}
