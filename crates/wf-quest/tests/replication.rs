//! Two peers playing the same quest through envelopes.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use wf_core::Document;
use wf_mechanics::{
    Attack, CombatPhase, Difficulty, LeveledSkillCheck, LootPile, SessionSettings, Skill,
};
use wf_quest::{
    ActionPayload, Card, CardName, CardPhase, Envelope, ManualClock, PathStep, QuestAction,
    QuestError, QuestSession, SavedQuest, Value,
};

const QUEST: &str = r#"<quest title="Ambush at the Ford">
    <roleplay title="Ford">
        <p>{{ gold = 2 }}</p>
        <choice text="Fight"><combat title="Ambush">
            <e>Troll</e>
            <e tier="2">Highwayman</e>
            <event on="round" if="_.round == 2"><roleplay title="Taunt">
                <choice text="Keep going"><roleplay title="Again">again</roleplay></choice>
            </roleplay></event>
            <event on="win"><decision title="Loot" maxrolls="3">
                <event on="light athletics"><roleplay title="Climbed"><p>{{ gold = gold + 5 }}</p>up</roleplay></event>
                <event on="knowledge failure"><roleplay title="Puzzled">hm</roleplay></event>
                <event on="success"><roleplay title="Fine">fine</roleplay></event>
                <event on="failure"><roleplay title="Oops">oops</roleplay></event>
                <event on="interrupted"><trigger>end</trigger></event>
            </decision></event>
            <event on="lose"><trigger>end</trigger></event>
        </combat></choice>
    </roleplay>
</quest>"#;

fn settings() -> SessionSettings {
    SessionSettings::default()
        .with_players(3)
        .with_seed(2024)
        .with_debounce(500)
}

fn peers() -> (QuestSession, QuestSession, ManualClock) {
    let doc = Arc::new(Document::parse(QUEST).unwrap());
    let clock = ManualClock::new();
    let host = QuestSession::new(Arc::clone(&doc), settings())
        .unwrap()
        .with_clock(clock.clone());
    let guest = QuestSession::join(host.id(), doc, settings())
        .unwrap()
        .with_clock(clock.clone());
    (host, guest, clock)
}

fn step(host: &mut QuestSession, guest: &mut QuestSession, action: QuestAction) {
    let envelope = host.dispatch(action).unwrap().unwrap();
    let json = envelope.to_json().unwrap();
    guest
        .receive(wf_quest::Envelope::from_json(&json).unwrap())
        .unwrap();
    assert_eq!(host.snapshot(), guest.snapshot());
}

fn to_card(name: CardName, phase: Option<CardPhase>) -> QuestAction {
    QuestAction::ToCard {
        name,
        phase,
        override_debounce: true,
    }
}

fn title(session: &QuestSession) -> Option<String> {
    session
        .cursor()
        .element()
        .and_then(|e| e.attr("title"))
        .map(str::to_string)
}

#[test]
fn two_peers_stay_identical_through_a_quest() {
    let (mut host, mut guest, _clock) = peers();

    step(&mut host, &mut guest, to_card(CardName::QuestCard, None));
    step(
        &mut host,
        &mut guest,
        QuestAction::Choose {
            step: PathStep::Choice(0),
        },
    );
    assert_eq!(title(&host).as_deref(), Some("Ambush"));

    step(&mut host, &mut guest, QuestAction::InitCombat { custom: false });
    assert_eq!(host.cursor().ctx().combat.as_ref().unwrap().tier, 6);
    step(
        &mut host,
        &mut guest,
        to_card(CardName::QuestCard, Some(CardPhase::Combat(CombatPhase::Timer))),
    );

    step(
        &mut host,
        &mut guest,
        QuestAction::CombatTimerStop {
            elapsed_millis: 4000,
        },
    );
    assert_eq!(host.card(), Card::combat(CombatPhase::ResolveAbilities));

    step(
        &mut host,
        &mut guest,
        QuestAction::CombatTimerStop {
            elapsed_millis: 20_000,
        },
    );
    assert_eq!(host.card(), Card::combat(CombatPhase::Roleplay));

    step(&mut host, &mut guest, QuestAction::MidCombatChoice { index: 0 });
    assert_eq!(host.card(), Card::combat(CombatPhase::Roleplay));
    step(&mut host, &mut guest, QuestAction::MidCombatChoice { index: 0 });
    assert_eq!(host.card(), Card::combat(CombatPhase::ResolveAbilities));

    step(&mut host, &mut guest, QuestAction::TierSumDelta { delta: -4 });
    step(&mut host, &mut guest, QuestAction::AdventurerDelta { delta: -1 });
    let combat = host.cursor().ctx().combat.as_ref().unwrap();
    assert_eq!((combat.tier, combat.num_alive_adventurers), (2, 2));

    step(
        &mut host,
        &mut guest,
        QuestAction::CombatTimerStop {
            elapsed_millis: 1000,
        },
    );
    assert_eq!(host.card(), Card::combat(CombatPhase::Surge));
    step(&mut host, &mut guest, QuestAction::ResolvePhase);
    assert_eq!(host.card(), Card::combat(CombatPhase::ResolveAbilities));

    step(
        &mut host,
        &mut guest,
        QuestAction::CombatEnd {
            victory: true,
            max_tier: 6,
        },
    );
    let combat = host.cursor().ctx().combat.as_ref().unwrap();
    assert!(combat.level_up);
    assert!(!combat.loot.is_empty());

    step(
        &mut host,
        &mut guest,
        QuestAction::Choose {
            step: PathStep::Event("win".into()),
        },
    );
    assert_eq!(title(&host).as_deref(), Some("Loot"));
    assert!(host.cursor().ctx().combat.is_none());

    step(&mut host, &mut guest, QuestAction::InitDecision);
    let selected = host.cursor().ctx().decision.as_ref().unwrap().leveled_checks[0];
    step(&mut host, &mut guest, QuestAction::DecisionSelect { selected });

    for _ in 0..3 {
        if title(&host).as_deref() != Some("Loot") {
            break;
        }
        step(&mut host, &mut guest, QuestAction::DecisionRoll { roll: 20 });
    }
    assert_eq!(title(&host).as_deref(), Some("Climbed"));
    assert_eq!(title(&guest).as_deref(), Some("Climbed"));
    assert_eq!(host.cursor().ctx().lookup("gold"), Some(Value::Number(7.0)));
    assert_eq!(
        serde_json::to_string(&host.snapshot()).unwrap(),
        serde_json::to_string(&guest.snapshot()).unwrap()
    );

    let restored = SavedQuest::capture(guest.cursor()).restore().unwrap();
    assert_eq!(restored.comparison_key(), guest.cursor().comparison_key());
}

#[test]
fn duplicates_and_gaps_leave_state_alone() {
    let (mut host, mut guest, _clock) = peers();
    let first = host
        .dispatch(to_card(CardName::QuestCard, None))
        .unwrap()
        .unwrap();
    let second = host
        .dispatch(QuestAction::Choose {
            step: PathStep::Choice(0),
        })
        .unwrap()
        .unwrap();
    let third = host
        .dispatch(QuestAction::InitCombat { custom: false })
        .unwrap()
        .unwrap();

    guest.receive(first.clone()).unwrap();
    let before = guest.snapshot();

    assert!(matches!(
        guest.receive(first),
        Err(QuestError::DuplicateAction(1))
    ));
    assert!(matches!(
        guest.receive(third.clone()),
        Err(QuestError::OutOfOrder {
            expected: 2,
            received: 3
        })
    ));
    assert_eq!(guest.snapshot(), before);
    assert!(!guest.is_out_of_sync());

    guest.receive(second).unwrap();
    guest.receive(third).unwrap();
    assert_eq!(guest.snapshot(), host.snapshot());
}

#[test]
fn out_of_sync_peer_recovers_from_snapshot() {
    let (mut host, mut guest, _clock) = peers();
    let first = host
        .dispatch(QuestAction::Choose {
            step: PathStep::Choice(0),
        })
        .unwrap()
        .unwrap();
    guest.receive(first).unwrap();

    // A roll with no decision in progress cannot apply on the guest.
    let bogus = wf_quest::Envelope {
        session: host.id(),
        id: 2,
        payload: wf_quest::ActionPayload::DecisionRoll { roll: 12 },
    };
    assert!(guest.receive(bogus).is_err());
    assert!(guest.is_out_of_sync());

    guest.resync(host.snapshot()).unwrap();
    assert!(!guest.is_out_of_sync());
    assert_eq!(guest.snapshot(), host.snapshot());

    let next = host
        .dispatch(QuestAction::InitCombat { custom: false })
        .unwrap()
        .unwrap();
    guest.receive(next).unwrap();
    assert_eq!(guest.snapshot(), host.snapshot());
}

#[test]
fn local_navigation_debounce_is_not_replicated() {
    let (mut host, mut guest, clock) = peers();
    let quick = QuestAction::ToCard {
        name: CardName::QuestCard,
        phase: None,
        override_debounce: false,
    };
    let first = host.dispatch(quick.clone()).unwrap().unwrap();
    clock.advance(10);
    assert!(host.dispatch(quick).unwrap().is_none());

    // The guest applies whatever arrives, however quickly.
    guest.receive(first).unwrap();
    assert_eq!(guest.snapshot(), host.snapshot());
}

/// Host and guest, both in the ambush fight.
fn in_fight() -> (QuestSession, QuestSession) {
    let (mut host, mut guest, _clock) = peers();
    step(&mut host, &mut guest, to_card(CardName::QuestCard, None));
    step(
        &mut host,
        &mut guest,
        QuestAction::Choose {
            step: PathStep::Choice(0),
        },
    );
    step(&mut host, &mut guest, QuestAction::InitCombat { custom: false });
    (host, guest)
}

/// The guest refuses `payload`, keeps its state and waits for a resync.
fn assert_refused(host: &QuestSession, guest: &mut QuestSession, payload: ActionPayload) {
    let before = guest.snapshot();
    let envelope = Envelope {
        session: host.id(),
        id: guest.last_applied() + 1,
        payload,
    };
    assert!(matches!(
        guest.receive(envelope),
        Err(QuestError::ReplicationMismatch(_))
    ));
    assert!(guest.is_out_of_sync());
    assert_eq!(guest.snapshot(), before);
    guest.resync(host.snapshot()).unwrap();
}

#[test]
fn impossible_round_draws_are_refused() {
    let (host, mut guest) = in_fight();
    let round = |damage, rolls: Vec<u32>| ActionPayload::CombatTimerStop {
        attack: Attack {
            damage,
            surge: false,
        },
        rolls,
    };

    assert_refused(&host, &mut guest, round(50, vec![5, 5, 5]));
    assert_refused(&host, &mut guest, round(3, vec![0, 12, 99]));
    assert_refused(&host, &mut guest, round(3, vec![12, 12]));

    guest.receive(Envelope {
        session: host.id(),
        id: guest.last_applied() + 1,
        payload: round(10, vec![1, 20, 7]),
    })
    .unwrap();
    assert_eq!(guest.cursor().ctx().combat.as_ref().unwrap().round_count, 1);
}

#[test]
fn loot_outside_the_budget_is_refused() {
    let (host, mut guest) = in_fight();
    let end = |victory, loot: Vec<LootPile>| ActionPayload::CombatEnd {
        node: host.cursor().comparison_key(),
        victory,
        max_tier: 6,
        loot,
        level_up: victory,
    };
    let pile = |tier, count| LootPile { tier, count };

    // A tier 6 fight has a budget of 4.
    assert_refused(&host, &mut guest, end(true, vec![pile(4, 1)]));
    assert_refused(&host, &mut guest, end(true, vec![pile(1, 4), pile(2, 0)]));
    assert_refused(&host, &mut guest, end(true, vec![pile(1, 3)]));
    assert_refused(&host, &mut guest, end(false, vec![pile(1, 1)]));

    guest.receive(Envelope {
        session: host.id(),
        id: guest.last_applied() + 1,
        payload: end(true, vec![pile(1, 2), pile(2, 1)]),
    })
    .unwrap();
    assert_eq!(guest.card(), Card::combat(CombatPhase::Victory));
}

#[test]
fn checks_with_impossible_requirements_are_refused() {
    let (host, mut guest) = in_fight();
    let offering = |required_successes| ActionPayload::InitDecision {
        checks: vec![LeveledSkillCheck {
            persona: None,
            skill: Skill::Charisma,
            difficulty: Difficulty::Easy,
            required_successes,
        }],
    };

    assert_refused(&host, &mut guest, offering(0));
    assert_refused(&host, &mut guest, offering(4));

    guest.receive(Envelope {
        session: host.id(),
        id: guest.last_applied() + 1,
        payload: offering(2),
    })
    .unwrap();
    assert!(guest.cursor().ctx().decision.is_some());
}
