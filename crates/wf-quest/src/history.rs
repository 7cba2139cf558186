//! The stack of cards shown so far.

use crate::card::{Card, CardName, CardPhase, Transition};
use crate::cursor::QuestCursor;

/// A card that was shown, with the cursor it was shown for.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The card.
    pub card: Card,
    /// The position and context at that card.
    pub cursor: QuestCursor,
}

impl From<Transition> for HistoryEntry {
    fn from(t: Transition) -> Self {
        Self {
            card: t.card,
            cursor: t.cursor,
        }
    }
}

/// Append-only during forward play; [`History::return_to`] truncates.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a shown card.
    pub fn push(&mut self, entry: impl Into<HistoryEntry>) {
        self.entries.push(entry.into());
    }

    /// Number of recorded cards.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent card.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// All recorded cards, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Go back to the most recent card matching `name` and `phase` (either may
    /// be omitted), or to the one before it when `before` is set.
    ///
    /// Everything after the returned entry is dropped; the entry itself stays
    /// on the stack. With no match the history is left alone.
    pub fn return_to(
        &mut self,
        name: Option<CardName>,
        phase: Option<CardPhase>,
        before: bool,
    ) -> Option<HistoryEntry> {
        let found = self.entries.iter().rposition(|e| {
            name.is_none_or(|n| e.card.name == n) && phase.is_none_or(|p| e.card.phase == Some(p))
        })?;
        let index = if before { found.checked_sub(1)? } else { found };
        self.entries.truncate(index + 1);
        self.entries.last().cloned()
    }
}
