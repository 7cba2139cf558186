//! A quest being played by one peer, kept in step with the others.
//!
//! Every player action goes through [`QuestSession::dispatch`], which draws
//! any random values, applies the action and returns a numbered
//! [`Envelope`]. Other peers feed that envelope to [`QuestSession::receive`],
//! which applies the same transition from the carried values. Both paths share
//! one transition function, so the resulting states are identical.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use wf_core::Document;
use wf_mechanics::combat::{MAX_DAMAGE, loot_budget};
use wf_mechanics::decision::{MAX_REQUIRED_SUCCESSES, MIN_REQUIRED_SUCCESSES};
use wf_mechanics::random::D20;
use wf_mechanics::{Attack, LeveledSkillCheck, LootPile, SessionSettings};

use crate::action::{ActionPayload, Envelope, QuestAction};
use crate::card::{Card, CardName, CardPhase, Transition};
use crate::combat::{
    adventurer_delta, apply_combat_end, apply_timer_stop, handle_resolve_phase, init_combat,
    mid_combat_choice, resolve_combat_end, resolve_timer_stop, tier_sum_delta,
};
use crate::context::TemplateContext;
use crate::cursor::QuestCursor;
use crate::decision::{
    apply_init_decision, handle_decision_roll, handle_decision_select, resolve_init_decision,
    to_decision_card,
};
use crate::error::{QuestError, QuestResult};
use crate::history::History;

/// Source of wall-clock time for the navigation debounce.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Milliseconds since some fixed point.
    fn now_millis(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Everything peers must agree on, in comparable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The session.
    pub session: Uuid,
    /// Card on screen.
    pub card: Card,
    /// Comparison key of the current node.
    pub position: String,
    /// Context at the current node.
    pub ctx: TemplateContext,
    /// Id of the last applied action.
    pub last_applied: u64,
}

enum Applied {
    Forward(Box<Transition>),
    Returned(History),
}

/// One peer's view of a quest being played.
#[derive(Debug)]
pub struct QuestSession {
    id: Uuid,
    settings: SessionSettings,
    card: Card,
    cursor: QuestCursor,
    history: History,
    last_applied: u64,
    out_of_sync: bool,
    clock: Box<dyn Clock>,
    last_navigation: Option<u64>,
}

impl QuestSession {
    /// Start a new session on `document`.
    pub fn new(document: Arc<Document>, settings: SessionSettings) -> QuestResult<Self> {
        Self::join(Uuid::new_v4(), document, settings)
    }

    /// Join an existing session. Every peer must use the same document and
    /// settings.
    pub fn join(
        id: Uuid,
        document: Arc<Document>,
        settings: SessionSettings,
    ) -> QuestResult<Self> {
        let cursor = QuestCursor::start(document, settings.seed)?;
        let card = Card::new(CardName::QuestStart);
        let mut history = History::new();
        history.push(Transition::new(cursor.clone(), card));
        debug!(session = %id, "session started");
        Ok(Self {
            id,
            settings,
            card,
            cursor,
            history,
            last_applied: 0,
            out_of_sync: false,
            clock: Box::new(SystemClock),
            last_navigation: None,
        })
    }

    /// Use another clock for the navigation debounce.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The card on screen.
    pub fn card(&self) -> Card {
        self.card
    }

    /// The current position.
    pub fn cursor(&self) -> &QuestCursor {
        &self.cursor
    }

    /// Cards shown so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Id of the last applied action.
    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Whether a replicated action failed to apply.
    pub fn is_out_of_sync(&self) -> bool {
        self.out_of_sync
    }

    /// Apply a local action.
    ///
    /// Returns the envelope to send to the other peers, or `None` when a
    /// navigation was dropped by the debounce.
    pub fn dispatch(&mut self, action: QuestAction) -> QuestResult<Option<Envelope>> {
        if self.out_of_sync {
            return Err(QuestError::OutOfSync);
        }
        if let QuestAction::ToCard {
            override_debounce: false,
            ..
        } = action
        {
            let now = self.clock.now_millis();
            let debounced = self
                .last_navigation
                .is_some_and(|last| now.saturating_sub(last) < self.settings.navigation_debounce_ms);
            if debounced {
                debug!("navigation debounced");
                return Ok(None);
            }
            self.last_navigation = Some(now);
        }

        let payload = self.resolve(action)?;
        let applied = self.transition(&payload)?;
        self.commit(applied);
        self.last_applied += 1;
        debug!(id = self.last_applied, kind = payload.kind(), "dispatched");
        Ok(Some(Envelope {
            session: self.id,
            id: self.last_applied,
            payload,
        }))
    }

    /// Apply an action from another peer.
    ///
    /// Envelopes must arrive in order. Duplicates and gaps are rejected
    /// without touching the state. An envelope that does not fit the local
    /// state marks the session out of sync until [`resync`](Self::resync).
    pub fn receive(&mut self, envelope: Envelope) -> QuestResult<()> {
        if envelope.session != self.id {
            return Err(QuestError::ReplicationMismatch(format!(
                "envelope belongs to session {}",
                envelope.session
            )));
        }
        if self.out_of_sync {
            return Err(QuestError::OutOfSync);
        }
        let expected = self.last_applied + 1;
        if envelope.id < expected {
            warn!(id = envelope.id, expected, "duplicate action");
            return Err(QuestError::DuplicateAction(envelope.id));
        }
        if envelope.id > expected {
            warn!(id = envelope.id, expected, "action out of order");
            return Err(QuestError::OutOfOrder {
                expected,
                received: envelope.id,
            });
        }

        match self.transition(&envelope.payload) {
            Ok(applied) => {
                self.commit(applied);
                self.last_applied = envelope.id;
                debug!(id = envelope.id, kind = envelope.payload.kind(), "received");
                Ok(())
            }
            Err(error) => {
                warn!(id = envelope.id, %error, "replicated action rejected");
                self.out_of_sync = true;
                Err(match error {
                    QuestError::ReplicationMismatch(message) => {
                        QuestError::ReplicationMismatch(message)
                    }
                    other => QuestError::ReplicationMismatch(other.to_string()),
                })
            }
        }
    }

    /// The state peers compare.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.id,
            card: self.card,
            position: self.cursor.comparison_key(),
            ctx: self.cursor.ctx().clone(),
            last_applied: self.last_applied,
        }
    }

    /// Adopt another peer's snapshot and clear the out-of-sync flag.
    pub fn resync(&mut self, snapshot: SessionSnapshot) -> QuestResult<()> {
        if snapshot.session != self.id {
            return Err(QuestError::ReplicationMismatch(format!(
                "snapshot belongs to session {}",
                snapshot.session
            )));
        }
        let document = Arc::clone(self.cursor.document());
        let node = QuestCursor::locate_key(&document, &snapshot.position).ok_or_else(|| {
            QuestError::ReplicationMismatch(format!("unknown position {}", snapshot.position))
        })?;
        let cursor = QuestCursor::new(document, node, snapshot.ctx)?;
        self.commit(Applied::Forward(Box::new(Transition::new(
            cursor,
            snapshot.card,
        ))));
        self.last_applied = snapshot.last_applied;
        self.out_of_sync = false;
        debug!(last_applied = self.last_applied, "resynced");
        Ok(())
    }

    /// Make the random draws an action needs.
    fn resolve(&self, action: QuestAction) -> QuestResult<ActionPayload> {
        let cursor = &self.cursor;
        let settings = &self.settings;
        Ok(match action {
            QuestAction::ToCard {
                name,
                phase,
                override_debounce,
            } => ActionPayload::ToCard {
                name,
                phase,
                override_debounce,
            },
            QuestAction::Choose { step } => ActionPayload::Choose { step },
            QuestAction::InitCombat { custom } => ActionPayload::InitCombat { custom },
            QuestAction::CombatTimerStop { elapsed_millis } => {
                let (attack, rolls) = resolve_timer_stop(cursor, settings, elapsed_millis)?;
                ActionPayload::CombatTimerStop { attack, rolls }
            }
            QuestAction::ResolvePhase => ActionPayload::ResolvePhase,
            QuestAction::MidCombatChoice { index } => ActionPayload::MidCombatChoice { index },
            QuestAction::CombatEnd { victory, max_tier } => ActionPayload::CombatEnd {
                node: cursor.comparison_key(),
                victory,
                max_tier,
                loot: resolve_combat_end(cursor, victory, max_tier)?,
                level_up: levels_up(settings, victory, max_tier),
            },
            QuestAction::TierSumDelta { delta } => ActionPayload::TierSumDelta { delta },
            QuestAction::AdventurerDelta { delta } => ActionPayload::AdventurerDelta { delta },
            QuestAction::InitDecision => ActionPayload::InitDecision {
                checks: resolve_init_decision(cursor, settings)?,
            },
            QuestAction::DecisionSelect { selected } => ActionPayload::DecisionSelect { selected },
            QuestAction::DecisionRoll { roll } => ActionPayload::DecisionRoll { roll },
            QuestAction::DecisionCard { phase } => ActionPayload::DecisionCard { phase },
            QuestAction::Return {
                name,
                phase,
                before,
            } => ActionPayload::Return {
                name,
                phase,
                before,
            },
        })
    }

    /// The transition shared by local and replicated actions. Nothing is
    /// changed until the result is committed.
    fn transition(&self, payload: &ActionPayload) -> QuestResult<Applied> {
        let cursor = &self.cursor;
        let settings = &self.settings;
        check_drawn_values(payload, settings)?;
        let transition = match payload {
            ActionPayload::ToCard { name, phase, .. } => to_card(cursor, *name, *phase),
            ActionPayload::Choose { step } => {
                let mut next = cursor.next(step.clone()).ok_or_else(|| QuestError::InvalidPath {
                    index: cursor.ctx().path.len(),
                    step: step.to_string(),
                })?;
                let ctx = next.ctx_mut();
                ctx.combat = None;
                ctx.decision = None;
                Transition::enter(next)
            }
            ActionPayload::InitCombat { custom } => init_combat(cursor, settings, *custom)?,
            ActionPayload::CombatTimerStop { attack, rolls } => {
                apply_timer_stop(cursor, *attack, rolls.clone())?
            }
            ActionPayload::ResolvePhase => handle_resolve_phase(cursor)?,
            ActionPayload::MidCombatChoice { index } => mid_combat_choice(cursor, *index)?,
            ActionPayload::CombatEnd {
                node,
                victory,
                max_tier,
                loot,
                level_up,
            } => {
                if *node != cursor.comparison_key() {
                    return Err(QuestError::ReplicationMismatch(format!(
                        "combat ended at {node} but this peer is at {}",
                        cursor.comparison_key()
                    )));
                }
                if *level_up != levels_up(settings, *victory, *max_tier) {
                    return Err(QuestError::ReplicationMismatch(
                        "level-up differs from local settings".to_string(),
                    ));
                }
                apply_combat_end(cursor, settings, *victory, *max_tier, loot.clone())?
            }
            ActionPayload::TierSumDelta { delta } => {
                Transition::new(tier_sum_delta(cursor, *delta)?, self.card)
            }
            ActionPayload::AdventurerDelta { delta } => {
                Transition::new(adventurer_delta(cursor, settings, *delta)?, self.card)
            }
            ActionPayload::InitDecision { checks } => apply_init_decision(cursor, checks.clone())?,
            ActionPayload::DecisionSelect { selected } => {
                let offered = cursor
                    .ctx()
                    .decision
                    .as_ref()
                    .ok_or(QuestError::NoDecision)?
                    .leveled_checks
                    .contains(selected);
                if !offered {
                    return Err(QuestError::ReplicationMismatch(format!(
                        "check {selected} was not offered"
                    )));
                }
                handle_decision_select(cursor, *selected)?
            }
            ActionPayload::DecisionRoll { roll } => handle_decision_roll(cursor, settings, *roll)?,
            ActionPayload::DecisionCard { phase } => to_decision_card(cursor, *phase)?,
            ActionPayload::Return {
                name,
                phase,
                before,
            } => {
                let mut history = self.history.clone();
                history.return_to(*name, *phase, *before).ok_or_else(|| {
                    QuestError::ReplicationMismatch("no matching card to return to".to_string())
                })?;
                return Ok(Applied::Returned(history));
            }
        };
        Ok(Applied::Forward(Box::new(transition)))
    }

    fn commit(&mut self, applied: Applied) {
        match applied {
            Applied::Forward(transition) => {
                self.card = transition.card;
                self.cursor = transition.cursor.clone();
                self.history.push(*transition);
            }
            Applied::Returned(history) => {
                if let Some(last) = history.last() {
                    self.card = last.card;
                    self.cursor = last.cursor.clone();
                }
                self.history = history;
            }
        }
    }
}

fn mismatch(message: impl Into<String>) -> QuestError {
    QuestError::ReplicationMismatch(message.into())
}

/// Reject carried random values that no local draw could have produced.
fn check_drawn_values(payload: &ActionPayload, settings: &SessionSettings) -> QuestResult<()> {
    match payload {
        ActionPayload::CombatTimerStop { attack, rolls } => check_round(attack, rolls, settings),
        ActionPayload::CombatEnd {
            victory,
            max_tier,
            loot,
            ..
        } => check_loot(*victory, *max_tier, loot),
        ActionPayload::InitDecision { checks } => check_leveled(checks),
        _ => Ok(()),
    }
}

fn check_round(attack: &Attack, rolls: &[u32], settings: &SessionSettings) -> QuestResult<()> {
    if attack.damage > MAX_DAMAGE {
        return Err(mismatch(format!(
            "attack damage {} exceeds {MAX_DAMAGE}",
            attack.damage
        )));
    }
    if rolls.len() != settings.num_players as usize {
        return Err(mismatch(format!(
            "{} rolls for {} players",
            rolls.len(),
            settings.num_players
        )));
    }
    if let Some(roll) = rolls.iter().find(|r| !(1..=D20).contains(*r)) {
        return Err(mismatch(format!("roll {roll} is not a d20 result")));
    }
    Ok(())
}

fn check_loot(victory: bool, max_tier: u32, loot: &[LootPile]) -> QuestResult<()> {
    if let Some(pile) = loot
        .iter()
        .find(|p| !(1..=3).contains(&p.tier) || p.count == 0)
    {
        return Err(mismatch(format!(
            "invalid loot pile of {} tier {} cards",
            pile.count, pile.tier
        )));
    }
    let spent: u32 = loot.iter().map(|p| p.tier * p.count).sum();
    let budget = if victory { loot_budget(max_tier) } else { 0 };
    if spent != budget {
        return Err(mismatch(format!(
            "loot worth {spent} but the budget is {budget}"
        )));
    }
    Ok(())
}

fn check_leveled(checks: &[LeveledSkillCheck]) -> QuestResult<()> {
    let range = MIN_REQUIRED_SUCCESSES..=MAX_REQUIRED_SUCCESSES;
    match checks.iter().find(|c| !range.contains(&c.required_successes)) {
        Some(check) => Err(mismatch(format!(
            "check {check} requires {} successes",
            check.required_successes
        ))),
        None => Ok(()),
    }
}

fn levels_up(settings: &SessionSettings, victory: bool, max_tier: u32) -> bool {
    victory && settings.num_players <= max_tier
}

/// Show a card, keeping any minigame phase in step with it.
fn to_card(cursor: &QuestCursor, name: CardName, phase: Option<CardPhase>) -> Transition {
    let mut next = cursor.clone();
    let ctx = next.ctx_mut();
    match phase {
        Some(CardPhase::Combat(p)) => {
            if let Some(combat) = ctx.combat.as_mut() {
                combat.phase = Some(p);
            }
        }
        Some(CardPhase::Decision(p)) => {
            if let Some(decision) = ctx.decision.as_mut() {
                decision.phase = Some(p);
            }
        }
        None => {}
    }
    Transition::new(next, Card { name, phase })
}
