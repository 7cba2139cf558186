//! Cards shown to players and the transition that lands on one.

use serde::{Deserialize, Serialize};
use tracing::warn;
use wf_mechanics::{CombatPhase, DecisionPhase};

use crate::cursor::{QuestCursor, Trigger};

/// Chained trigger events followed before giving up.
const MAX_TRIGGER_DEPTH: usize = 32;

/// Which card is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardName {
    /// The title card before the first quest card.
    QuestStart,
    /// A card from the quest tree.
    QuestCard,
    /// The quest is over.
    QuestEnd,
}

/// The sub-phase of a quest card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardPhase {
    /// A combat phase.
    Combat(CombatPhase),
    /// A decision phase.
    Decision(DecisionPhase),
}

/// A card name plus optional phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// The card.
    pub name: CardName,
    /// Its phase, if the card has phases.
    pub phase: Option<CardPhase>,
}

impl Card {
    /// A card without a phase.
    pub fn new(name: CardName) -> Self {
        Self { name, phase: None }
    }

    /// A quest card in the given combat phase.
    pub fn combat(phase: CombatPhase) -> Self {
        Self {
            name: CardName::QuestCard,
            phase: Some(CardPhase::Combat(phase)),
        }
    }

    /// A quest card in the given decision phase.
    pub fn decision(phase: DecisionPhase) -> Self {
        Self {
            name: CardName::QuestCard,
            phase: Some(CardPhase::Decision(phase)),
        }
    }
}

impl Default for Card {
    fn default() -> Self {
        Self::new(CardName::QuestStart)
    }
}

/// The result of a quest operation: the new position plus the card to show.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Where play continues.
    pub cursor: QuestCursor,
    /// What to show.
    pub card: Card,
}

impl Transition {
    /// A transition to an explicit card.
    pub fn new(cursor: QuestCursor, card: Card) -> Self {
        Self { cursor, card }
    }

    /// Land on `cursor`, expanding triggers.
    ///
    /// `end` shows the quest end card; a named trigger follows the nearest
    /// matching event and lands again. A trigger whose event cannot be found
    /// is shown as an ordinary card.
    pub fn enter(cursor: QuestCursor) -> Self {
        let mut cursor = cursor;
        for _ in 0..MAX_TRIGGER_DEPTH {
            match cursor.trigger() {
                Some(Trigger::End) => return Self::new(cursor, Card::new(CardName::QuestEnd)),
                Some(Trigger::Event(_)) => match cursor.handle_trigger_event() {
                    Some(next) => cursor = next,
                    None => break,
                },
                Some(Trigger::Goto(_)) | None => break,
            }
        }
        if cursor.trigger().is_some_and(|t| matches!(t, Trigger::Event(_))) {
            warn!(node = %cursor.node(), "trigger event did not resolve");
        }
        Self::new(cursor, Card::new(CardName::QuestCard))
    }
}
