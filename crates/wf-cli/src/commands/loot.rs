use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use wf_mechanics::combat::{generate_loot, loot_budget};
use wf_mechanics::random::{next_seed, seeded};

pub fn run(max_tier: u32, trials: u32, seed: u64) -> Result<(), String> {
    if trials == 0 {
        return Err("trials must be at least 1".into());
    }

    let mut by_tier = [0u64; 3];
    let mut seed = seed;
    for _ in 0..trials {
        for pile in generate_loot(max_tier, &mut seeded(seed)) {
            let slot = (pile.tier as usize).checked_sub(1);
            if let Some(total) = slot.and_then(|i| by_tier.get_mut(i)) {
                *total += u64::from(pile.count);
            }
        }
        seed = next_seed(seed);
    }

    let trials_f = f64::from(trials);
    let cards: u64 = by_tier.iter().sum();
    println!(
        "  {} {}",
        "Loot".bold(),
        format!("(max tier {max_tier}, {trials} trials)").dimmed()
    );
    println!("  Budget: {}", loot_budget(max_tier));
    println!("  Average cards: {:.2}", cards as f64 / trials_f);
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Loot tier", "Cards", "Per fight"]);
    for (i, total) in by_tier.iter().enumerate() {
        table.add_row(vec![
            format!("{}", i + 1),
            total.to_string(),
            format!("{:.2}", *total as f64 / trials_f),
        ]);
    }
    println!("{table}");
    Ok(())
}
