//! Session settings and difficulty presets.

use serde::{Deserialize, Serialize};

use crate::error::{MechError, MechResult};

/// Smallest supported party size.
pub const MIN_PLAYERS: u32 = 1;
/// Largest supported party size.
pub const MAX_PLAYERS: u32 = 6;

/// Settings shared by every peer in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Number of adventurers at the table (1-6).
    pub num_players: u32,
    /// Combat difficulty key (`easy`, `normal`, `hard`, `impossible`).
    pub difficulty: String,
    /// Base combat round timer in seconds.
    pub timer_seconds: u32,
    /// Seed for the initial quest context.
    pub seed: u64,
    /// Minimum gap between two local card navigations.
    pub navigation_debounce_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            num_players: 3,
            difficulty: "normal".to_string(),
            timer_seconds: 10,
            seed: 42,
            navigation_debounce_ms: 500,
        }
    }
}

impl SessionSettings {
    /// Set the party size (clamped to 1-6).
    pub fn with_players(mut self, num_players: u32) -> Self {
        self.num_players = num_players.clamp(MIN_PLAYERS, MAX_PLAYERS);
        self
    }

    /// Set the combat difficulty key.
    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = difficulty.into();
        self
    }

    /// Set the base round timer.
    pub fn with_timer(mut self, seconds: u32) -> Self {
        self.timer_seconds = seconds;
        self
    }

    /// Set the initial context seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the navigation debounce window.
    pub fn with_debounce(mut self, millis: u64) -> Self {
        self.navigation_debounce_ms = millis;
        self
    }

    /// Read settings from JSON. Missing fields take their defaults and the
    /// party size is clamped.
    pub fn from_json(json: &str) -> MechResult<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| MechError::InvalidConfig(e.to_string()))?;
        let players = settings.num_players;
        Ok(settings.with_players(players))
    }

    /// Look up the combat preset for the configured difficulty.
    pub fn combat_difficulty(&self) -> MechResult<CombatDifficulty> {
        CombatDifficulty::from_key(&self.difficulty)
    }

    /// Damage scale for the party size.
    pub fn player_damage_multiplier(&self) -> f64 {
        match self.num_players {
            1 | 2 => 0.5,
            3 => 0.75,
            4 => 1.0,
            5 => 1.25,
            6 => 1.5,
            _ => 1.0,
        }
    }

    /// Round-timer scale for the party size.
    pub fn player_time_multiplier(&self) -> f64 {
        match self.num_players {
            1 | 2 => 1.2,
            3 => 1.1,
            4 => 1.0,
            5 | 6 => 0.9,
            _ => 1.0,
        }
    }

    /// Length of a combat round in milliseconds.
    pub fn round_time_millis(&self) -> u64 {
        (f64::from(self.timer_seconds) * 1000.0 * self.player_time_multiplier()).round() as u64
    }
}

/// Combat tuning selected by difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatDifficulty {
    /// Scale applied to every generated attack.
    pub damage_multiplier: f64,
    /// Surges happen every `surge_period` rounds.
    pub surge_period: u32,
}

impl CombatDifficulty {
    /// Look up a preset by key (case-insensitive).
    pub fn from_key(key: &str) -> MechResult<Self> {
        let (damage_multiplier, surge_period) = match key.to_ascii_lowercase().as_str() {
            "easy" => (0.7, 4),
            "normal" => (1.0, 3),
            "hard" => (1.2, 3),
            "impossible" => (1.5, 2),
            _ => return Err(MechError::UnknownDifficulty(key.to_string())),
        };
        Ok(Self {
            damage_multiplier,
            surge_period,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let s = SessionSettings::default();
        assert_eq!(s.num_players, 3);
        assert_eq!(s.difficulty, "normal");
        assert!(s.combat_difficulty().is_ok());
    }

    #[test]
    fn builder_methods() {
        let s = SessionSettings::default()
            .with_players(5)
            .with_difficulty("hard")
            .with_timer(20)
            .with_seed(9)
            .with_debounce(0);
        assert_eq!(s.num_players, 5);
        assert_eq!(s.timer_seconds, 20);
        assert_eq!(s.seed, 9);
        assert_eq!(s.navigation_debounce_ms, 0);
        assert_eq!(s.combat_difficulty().unwrap().damage_multiplier, 1.2);
    }

    #[test]
    fn players_clamped() {
        assert_eq!(SessionSettings::default().with_players(0).num_players, 1);
        assert_eq!(SessionSettings::default().with_players(40).num_players, 6);
    }

    #[test]
    fn unknown_difficulty_is_error() {
        let s = SessionSettings::default().with_difficulty("nightmare");
        assert_eq!(
            s.combat_difficulty(),
            Err(MechError::UnknownDifficulty("nightmare".to_string()))
        );
    }

    #[test]
    fn json_partial_and_clamped() {
        let s = SessionSettings::from_json(r#"{"num_players": 9, "difficulty": "easy"}"#).unwrap();
        assert_eq!(s.num_players, 6);
        assert_eq!(s.difficulty, "easy");
        assert_eq!(s.timer_seconds, 10);
        assert!(matches!(
            SessionSettings::from_json("{nope"),
            Err(MechError::InvalidConfig(_))
        ));
    }

    #[test]
    fn round_time_scales_with_party() {
        let s = SessionSettings::default().with_players(1).with_timer(10);
        assert_eq!(s.round_time_millis(), 12_000);
        let s = s.with_players(4);
        assert_eq!(s.round_time_millis(), 10_000);
    }
}
