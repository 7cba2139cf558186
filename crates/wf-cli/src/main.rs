//! CLI frontend for the Wayfarer quest interpreter.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "wf",
    about = "Wayfarer: play and verify card-driven quests",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a quest and validate its conditions, text operations and gotos
    Check {
        /// Quest markup file
        file: PathBuf,
    },

    /// Play a list of actions against a quest and print every transition
    Replay {
        /// Quest markup file
        file: PathBuf,

        /// JSON file holding an array of actions
        #[arg(short, long)]
        actions: PathBuf,

        /// JSON file with session settings
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Print envelopes and the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the loot a fight awards on average
    Loot {
        /// Highest total enemy tier reached
        #[arg(short, long, default_value = "8")]
        max_tier: u32,

        /// Number of draws to average
        #[arg(short, long, default_value = "1000")]
        trials: u32,

        /// RNG seed for the first draw
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("WF_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { file } => commands::check::run(&file),
        Commands::Replay {
            file,
            actions,
            settings,
            seed,
            json,
        } => commands::replay::run(&file, &actions, settings.as_deref(), seed, json),
        Commands::Loot {
            max_tier,
            trials,
            seed,
        } => commands::loot::run(max_tier, trials, seed),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
