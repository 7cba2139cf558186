//! Per-cursor simulation context.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use wf_mechanics::random::next_seed;
use wf_mechanics::{CombatState, DecisionState};

/// Scope names reserved for read-only combat values.
pub const BUILTIN_PREFIX: &str = "_.";

/// One navigation key taken from a card.
///
/// Serialized as a number (`Choice`), the string `"#"` (`Sibling`), or any
/// other string (`Event`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawStep", into = "RawStep")]
pub enum PathStep {
    /// The n-th visible `<choice>`.
    Choice(usize),
    /// The visible `<event on="...">` with this name.
    Event(String),
    /// The next visible card after this one.
    Sibling,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Index(usize),
    Name(String),
}

const SIBLING_KEY: &str = "#";

impl From<RawStep> for PathStep {
    fn from(raw: RawStep) -> Self {
        match raw {
            RawStep::Index(i) => PathStep::Choice(i),
            RawStep::Name(name) if name == SIBLING_KEY => PathStep::Sibling,
            RawStep::Name(name) => PathStep::Event(name),
        }
    }
}

impl From<PathStep> for RawStep {
    fn from(step: PathStep) -> Self {
        match step {
            PathStep::Choice(i) => RawStep::Index(i),
            PathStep::Event(name) => RawStep::Name(name),
            PathStep::Sibling => RawStep::Name(SIBLING_KEY.to_string()),
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Choice(i) => write!(f, "choice {i}"),
            PathStep::Event(name) => write!(f, "event \"{name}\""),
            PathStep::Sibling => write!(f, "next"),
        }
    }
}

/// A scope value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
}

impl Value {
    /// Truthiness: `false` and `0` are false.
    pub fn is_truthy(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0 && !n.is_nan(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Simulation state carried by a cursor.
///
/// Cloning a context deep-copies everything; contexts never share mutable
/// state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Seed for the next random draw.
    pub seed: u64,
    /// Navigation keys taken since the first card.
    pub path: Vec<PathStep>,
    /// Variables set by card text operations.
    pub scope: BTreeMap<String, Value>,
    /// Combat in progress, if any.
    pub combat: Option<CombatState>,
    /// Decision in progress, if any.
    pub decision: Option<DecisionState>,
}

impl TemplateContext {
    /// A fresh context with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Move the seed past a randomness-consuming transition.
    pub fn advance_seed(&mut self) {
        self.seed = next_seed(self.seed);
    }

    /// Resolve a name: combat built-ins first, then the scope.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(builtin) = name.strip_prefix(BUILTIN_PREFIX) {
            let combat = self.combat.as_ref()?;
            let n = match builtin {
                "tier" => combat.tier,
                "round" => combat.round_count,
                "adventurers" => combat.num_alive_adventurers,
                _ => return None,
            };
            return Some(Value::Number(f64::from(n)));
        }
        self.scope.get(name).copied()
    }
}
