//! Known enemy table.

use serde::Serialize;

/// A catalogued enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Encounter {
    /// Display name.
    pub name: &'static str,
    /// Strength rating.
    pub tier: u32,
    /// Enemy class.
    pub class: &'static str,
}

const fn enc(name: &'static str, tier: u32, class: &'static str) -> Encounter {
    Encounter { name, tier, class }
}

static ENCOUNTERS: &[Encounter] = &[
    enc("Skeleton Swordsman", 1, "Undead"),
    enc("Skeleton Archer", 1, "Undead"),
    enc("Zombie", 1, "Undead"),
    enc("Wraith", 3, "Undead"),
    enc("Lich", 5, "Undead"),
    enc("Goblin Scout", 1, "Goblin"),
    enc("Goblin Shaman", 2, "Goblin"),
    enc("Goblin Warlord", 3, "Goblin"),
    enc("Wolf", 1, "Beast"),
    enc("Dire Wolf", 2, "Beast"),
    enc("Cave Bear", 3, "Beast"),
    enc("Bandit", 1, "Human"),
    enc("Bandit Captain", 2, "Human"),
    enc("Cultist", 1, "Human"),
    enc("Troll", 4, "Giant"),
    enc("Young Dragon", 5, "Dragon"),
];

/// Look up an enemy by name, ignoring case and surrounding whitespace.
pub fn find_encounter(name: &str) -> Option<&'static Encounter> {
    let name = name.trim();
    ENCOUNTERS.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let e = find_encounter("  skeleton SWORDSMAN ").unwrap();
        assert_eq!(e.name, "Skeleton Swordsman");
        assert_eq!(e.tier, 1);
        assert_eq!(e.class, "Undead");
    }

    #[test]
    fn unknown_enemy() {
        assert!(find_encounter("Gelatinous Cube").is_none());
    }
}
