//! Persisting a quest position as its markup plus the path walked through it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use wf_core::Document;

use crate::context::PathStep;
use crate::cursor::QuestCursor;
use crate::error::{QuestError, QuestResult};

/// A saved quest position.
///
/// Only the markup and the navigation keys are kept; the cursor is rebuilt by
/// walking the keys again, which replays every card's text operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQuest {
    /// The quest markup.
    pub xml: String,
    /// Navigation keys from the first card.
    pub path: Vec<PathStep>,
    /// Seed at the time of saving.
    pub seed: u64,
    /// When the save was made.
    pub saved_at: DateTime<Utc>,
}

impl SavedQuest {
    /// Save the cursor's position.
    pub fn capture(cursor: &QuestCursor) -> Self {
        Self {
            xml: cursor.document().to_markup(),
            path: cursor.ctx().path.clone(),
            seed: cursor.ctx().seed,
            saved_at: Utc::now(),
        }
    }

    /// Rebuild the cursor.
    ///
    /// Combat and decision state is not saved; a path that went through a
    /// condition depending on it may no longer resolve.
    pub fn restore(&self) -> QuestResult<QuestCursor> {
        let document = Arc::new(Document::parse(&self.xml)?);
        let mut cursor = QuestCursor::start(document, self.seed)?;
        for (index, step) in self.path.iter().enumerate() {
            cursor = cursor
                .next(step.clone())
                .ok_or_else(|| QuestError::InvalidPath {
                    index,
                    step: step.to_string(),
                })?;
        }
        cursor.ctx_mut().seed = self.seed;
        debug!(steps = self.path.len(), node = %cursor.node(), "restored quest");
        Ok(cursor)
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> QuestResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> QuestResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
