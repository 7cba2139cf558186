//! Quest interpreter for Wayfarer.
//!
//! A [`QuestCursor`] walks the immutable element tree of a quest while
//! carrying its own [`TemplateContext`]: the seed, the navigation path, the
//! variables set by card text, and any combat or decision in progress.
//! Operations never change a cursor in place; they return a [`Transition`]
//! holding a new cursor and the [`Card`] to show.
//!
//! [`QuestSession`] turns player actions into numbered [`Envelope`]s so that
//! several peers playing the same quest stay in the same state.

pub mod action;
pub mod card;
pub mod combat;
pub mod condition;
pub mod context;
pub mod cursor;
pub mod decision;
pub mod error;
pub mod history;
pub mod saved;
pub mod session;

pub use action::{ActionPayload, Envelope, QuestAction};
pub use card::{Card, CardName, CardPhase, Transition};
pub use condition::{ConditionError, evaluate_condition, interpolate};
pub use context::{PathStep, TemplateContext, Value};
pub use cursor::{QuestCursor, Trigger};
pub use error::{Notice, QuestError, QuestResult};
pub use history::{History, HistoryEntry};
pub use saved::SavedQuest;
pub use session::{Clock, ManualClock, QuestSession, SessionSnapshot, SystemClock};
