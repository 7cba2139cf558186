//! Error types for the quest interpreter.

use wf_core::TreeError;
use wf_mechanics::MechError;

use crate::condition::ConditionError;

/// Errors that can occur while playing a quest.
#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    /// The quest markup could not be read.
    #[error("quest markup: {0}")]
    Tree(#[from] TreeError),

    /// A mechanics rule rejected the operation.
    #[error(transparent)]
    Mechanics(#[from] MechError),

    /// A condition or text operation could not be evaluated.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// The quest has no visible card to start on.
    #[error("quest has no starting card")]
    NoStartCard,

    /// The operation needs a combat in progress.
    #[error("no combat in progress")]
    NoCombat,

    /// The operation needs a decision in progress.
    #[error("no decision in progress")]
    NoDecision,

    /// A roll was made before a skill check was selected.
    #[error("no skill check selected")]
    NoSelectedCheck,

    /// A saved path does not resolve against the quest.
    #[error("path step {index} ({step}) does not resolve")]
    InvalidPath {
        /// Position of the failing step.
        index: usize,
        /// The failing step.
        step: String,
    },

    /// An action id that was already applied.
    #[error("action {0} was already applied")]
    DuplicateAction(u64),

    /// An action id that skips ahead of the sequence.
    #[error("action {received} arrived out of order (expected {expected})")]
    OutOfOrder {
        /// The next id this peer can apply.
        expected: u64,
        /// The id that arrived.
        received: u64,
    },

    /// A replicated action does not fit the local state.
    #[error("replicated action does not match local state: {0}")]
    ReplicationMismatch(String),

    /// The session stopped applying actions after a mismatch.
    #[error("session is out of sync")]
    OutOfSync,

    /// JSON encoding or decoding failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// How an error should be surfaced to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Stops play until acknowledged.
    Blocking,
    /// Dismissible; play continues.
    Transient,
}

impl QuestError {
    /// Classify the error for display.
    pub fn notice(&self) -> Notice {
        match self {
            QuestError::Json(_) | QuestError::DuplicateAction(_) | QuestError::OutOfOrder { .. } => {
                Notice::Transient
            }
            _ => Notice::Blocking,
        }
    }
}

/// Convenience result type for quest operations.
pub type QuestResult<T> = Result<T, QuestError>;
