//! Error types for the mechanics engine.

/// Errors that can occur during mechanics operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MechError {
    /// The configured difficulty key has no combat preset.
    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),

    /// A decision node offered no event with a usable skill check.
    #[error("no valid choices for skill check")]
    NoSkillChecks,

    /// A roll value outside the d20 range was submitted.
    #[error("invalid roll {0}: expected 1-20")]
    InvalidRoll(u32),

    /// Session settings could not be read.
    #[error("invalid settings: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for mechanics operations.
pub type MechResult<T> = Result<T, MechError>;
