//! Player actions and the payloads replicated between peers.
//!
//! A [`QuestAction`] is what a player does. Before it is applied, any random
//! draws it needs are made once and the action becomes an [`ActionPayload`]
//! carrying the drawn values, so every peer applying the payload ends up in
//! the same state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wf_mechanics::{Attack, LeveledSkillCheck, LootPile};

use crate::card::{CardName, CardPhase};
use crate::context::PathStep;

/// Something a player does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestAction {
    /// Show a card.
    ToCard {
        /// The card.
        name: CardName,
        /// Its phase.
        #[serde(default)]
        phase: Option<CardPhase>,
        /// Skip the navigation debounce.
        #[serde(default)]
        override_debounce: bool,
    },
    /// Take a navigation key on the current card.
    Choose {
        /// The key.
        step: PathStep,
    },
    /// Start the fight at the current node.
    InitCombat {
        /// Started from the custom combat screen.
        #[serde(default)]
        custom: bool,
    },
    /// Stop the round timer.
    CombatTimerStop {
        /// Time the party took.
        elapsed_millis: u64,
    },
    /// Move on after a surge.
    ResolvePhase,
    /// Take a choice on the roleplay shown mid-combat.
    MidCombatChoice {
        /// Visible choice index.
        index: usize,
    },
    /// Finish the fight.
    CombatEnd {
        /// Whether the party won.
        victory: bool,
        /// Highest total enemy tier reached.
        max_tier: u32,
    },
    /// Adjust the remaining enemy tier.
    TierSumDelta {
        /// Amount to add.
        delta: i64,
    },
    /// Adjust the standing adventurers.
    AdventurerDelta {
        /// Amount to add.
        delta: i64,
    },
    /// Start the decision at the current node.
    InitDecision,
    /// Choose the check to roll for.
    DecisionSelect {
        /// The check.
        selected: LeveledSkillCheck,
    },
    /// Enter a roll.
    DecisionRoll {
        /// The d20 result.
        roll: u32,
    },
    /// Show the decision in another phase.
    DecisionCard {
        /// The phase.
        phase: wf_mechanics::DecisionPhase,
    },
    /// Go back to an earlier card.
    Return {
        /// Card to return to.
        #[serde(default)]
        name: Option<CardName>,
        /// Phase to return to.
        #[serde(default)]
        phase: Option<CardPhase>,
        /// Return to the card before the match.
        #[serde(default)]
        before: bool,
    },
}

/// An action with its random draws already made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Show a card.
    ToCard {
        /// The card.
        name: CardName,
        /// Its phase.
        #[serde(default)]
        phase: Option<CardPhase>,
        /// Skip the navigation debounce.
        #[serde(default)]
        override_debounce: bool,
    },
    /// Take a navigation key.
    Choose {
        /// The key.
        step: PathStep,
    },
    /// Start the fight.
    InitCombat {
        /// Started from the custom combat screen.
        custom: bool,
    },
    /// A finished round with the attack and rolls that were drawn.
    CombatTimerStop {
        /// The enemies' attack.
        attack: Attack,
        /// The party's rolls.
        rolls: Vec<u32>,
    },
    /// Move on after a surge.
    ResolvePhase,
    /// Take a mid-combat roleplay choice.
    MidCombatChoice {
        /// Visible choice index.
        index: usize,
    },
    /// A finished fight with the loot that was drawn.
    CombatEnd {
        /// Comparison key of the combat node.
        node: String,
        /// Whether the party won.
        victory: bool,
        /// Highest total enemy tier reached.
        max_tier: u32,
        /// Loot awarded.
        loot: Vec<LootPile>,
        /// Whether the party levels up.
        level_up: bool,
    },
    /// Adjust the remaining enemy tier.
    TierSumDelta {
        /// Amount to add.
        delta: i64,
    },
    /// Adjust the standing adventurers.
    AdventurerDelta {
        /// Amount to add.
        delta: i64,
    },
    /// Start a decision with the checks that were drawn.
    InitDecision {
        /// Offered checks.
        checks: Vec<LeveledSkillCheck>,
    },
    /// Choose the check to roll for.
    DecisionSelect {
        /// The check.
        selected: LeveledSkillCheck,
    },
    /// Enter a roll.
    DecisionRoll {
        /// The d20 result.
        roll: u32,
    },
    /// Show the decision in another phase.
    DecisionCard {
        /// The phase.
        phase: wf_mechanics::DecisionPhase,
    },
    /// Go back to an earlier card.
    Return {
        /// Card to return to.
        name: Option<CardName>,
        /// Phase to return to.
        phase: Option<CardPhase>,
        /// Return to the card before the match.
        before: bool,
    },
}

impl ActionPayload {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionPayload::ToCard { .. } => "to_card",
            ActionPayload::Choose { .. } => "choose",
            ActionPayload::InitCombat { .. } => "init_combat",
            ActionPayload::CombatTimerStop { .. } => "combat_timer_stop",
            ActionPayload::ResolvePhase => "resolve_phase",
            ActionPayload::MidCombatChoice { .. } => "mid_combat_choice",
            ActionPayload::CombatEnd { .. } => "combat_end",
            ActionPayload::TierSumDelta { .. } => "tier_sum_delta",
            ActionPayload::AdventurerDelta { .. } => "adventurer_delta",
            ActionPayload::InitDecision { .. } => "init_decision",
            ActionPayload::DecisionSelect { .. } => "decision_select",
            ActionPayload::DecisionRoll { .. } => "decision_roll",
            ActionPayload::DecisionCard { .. } => "decision_card",
            ActionPayload::Return { .. } => "return",
        }
    }
}

/// A payload numbered for in-order delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Session the action belongs to.
    pub session: Uuid,
    /// Position in the session's action sequence, starting at 1.
    pub id: u64,
    /// What to apply.
    pub payload: ActionPayload,
}

impl Envelope {
    /// Encode as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_read_from_json() {
        let actions: Vec<QuestAction> = serde_json::from_str(
            r#"[
                {"type": "choose", "step": 0},
                {"type": "choose", "step": "win"},
                {"type": "init_combat"},
                {"type": "combat_timer_stop", "elapsed_millis": 9000},
                {"type": "to_card", "name": "QUEST_END"},
                {"type": "return", "phase": {"combat": "TIMER"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            actions[1],
            QuestAction::Choose {
                step: PathStep::Event("win".into())
            }
        );
        assert_eq!(actions[2], QuestAction::InitCombat { custom: false });
        assert_eq!(
            actions[5],
            QuestAction::Return {
                name: None,
                phase: Some(CardPhase::Combat(wf_mechanics::CombatPhase::Timer)),
                before: false
            }
        );
    }

    #[test]
    fn envelope_json() {
        let envelope = Envelope {
            session: Uuid::nil(),
            id: 3,
            payload: ActionPayload::CombatTimerStop {
                attack: Attack {
                    damage: 4,
                    surge: true,
                },
                rolls: vec![3, 20],
            },
        };
        let json = envelope.to_json().unwrap();
        assert!(json.contains(r#""type":"combat_timer_stop""#));
        assert_eq!(Envelope::from_json(&json).unwrap(), envelope);
        assert_eq!(envelope.payload.kind(), "combat_timer_stop");
    }
}
