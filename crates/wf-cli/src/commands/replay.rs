use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use wf_mechanics::SessionSettings;
use wf_quest::{Card, CardPhase, ManualClock, QuestAction, QuestSession};

use super::load_quest;

pub fn run(
    file: &Path,
    actions: &Path,
    settings: Option<&Path>,
    seed: Option<u64>,
    json: bool,
) -> Result<(), String> {
    let (_, document) = load_quest(file)?;

    let mut settings = match settings {
        Some(path) => SessionSettings::from_json(&read(path)?).map_err(|e| e.to_string())?,
        None => SessionSettings::default(),
    };
    if let Some(seed) = seed {
        settings = settings.with_seed(seed);
    }
    let actions: Vec<QuestAction> = serde_json::from_str(&read(actions)?)
        .map_err(|e| format!("invalid actions file: {e}"))?;

    // Replays run on a manual clock, one debounce window per action, so that
    // navigation is never dropped.
    let clock = ManualClock::new();
    let step = settings.navigation_debounce_ms;
    let mut session = QuestSession::new(Arc::new(document), settings)
        .map_err(|e| e.to_string())?
        .with_clock(clock.clone());

    if !json {
        println!(
            "  {} {}",
            "Replay".bold(),
            format!("({} actions, seed={})", actions.len(), session.settings().seed).dimmed()
        );
        println!();
    }

    for (index, action) in actions.into_iter().enumerate() {
        clock.advance(step);
        let envelope = session
            .dispatch(action)
            .map_err(|e| format!("action {}: {e}", index + 1))?;
        match envelope {
            Some(envelope) if json => {
                let line = envelope.to_json().map_err(|e| e.to_string())?;
                println!("{line}");
            }
            Some(envelope) => {
                let title = session
                    .cursor()
                    .element()
                    .and_then(|e| e.attr("title"))
                    .unwrap_or("");
                println!(
                    "  {} {:<18} {} {}",
                    format!("[{:>3}]", envelope.id).dimmed(),
                    envelope.payload.kind(),
                    describe(session.card()).cyan(),
                    title
                );
            }
            None => {
                if !json {
                    println!("  {} debounced", "[  -]".dimmed());
                }
            }
        }
    }

    let snapshot = session.snapshot();
    if json {
        let line = serde_json::to_string(&snapshot).map_err(|e| e.to_string())?;
        println!("{line}");
        return Ok(());
    }

    println!();
    println!("  {} {}", "Final card:".bold(), describe(snapshot.card));
    println!("  {} {}", "Position:".bold(), snapshot.position);
    if let Some(combat) = &snapshot.ctx.combat {
        println!(
            "  {} tier {}, round {}, {} standing",
            "Combat:".bold(),
            combat.tier,
            combat.round_count,
            combat.num_alive_adventurers
        );
    }
    if !snapshot.ctx.scope.is_empty() {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Variable", "Value"]);
        for (name, value) in &snapshot.ctx.scope {
            table.add_row(vec![name.clone(), value.to_string()]);
        }
        println!();
        println!("{table}");
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))
}

fn describe(card: Card) -> String {
    let name = serde_json::to_value(card.name)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    match card.phase {
        Some(CardPhase::Combat(phase)) => format!("{name}/{phase:?}"),
        Some(CardPhase::Decision(phase)) => format!("{name}/{phase:?}"),
        None => name,
    }
}
