#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays, generates and converts Color Drain levels.

mod files;
mod level_transfer;
mod session;

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use color_drain_core::{LevelSnapshot, PuzzleConfig};
use color_drain_system_level_generation::{GeneratorConfig, LevelGeneration};
use tracing_subscriber::EnvFilter;

use crate::session::{Outcome, SessionSettings, Summary};

/// Command-line arguments for the Color Drain adapter.
#[derive(Debug, Parser)]
#[command(name = "color-drain", about = "Headless runner for the Color Drain puzzle")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plays a level with the autoplay dispatcher and prints a summary.
    Play(PlayArgs),
    /// Generates a level and prints it as JSON or as a level code.
    Generate {
        /// Campaign seed the level is derived from.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[command(flatten)]
        generator: GeneratorArgs,
        /// Prints a level code instead of JSON.
        #[arg(long)]
        code: bool,
    },
    /// Converts a JSON level file into a level code.
    Encode {
        /// Level file to convert.
        #[arg(long, value_name = "FILE")]
        level: PathBuf,
    },
    /// Converts a level code into JSON.
    Decode {
        /// Level code to convert.
        code: String,
    },
}

#[derive(Debug, Args)]
struct PlayArgs {
    #[command(flatten)]
    source: LevelSource,
    #[command(flatten)]
    generator: GeneratorArgs,
    /// JSON file overriding the puzzle timing and capacity parameters.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Seed used to shuffle the staging arrangement.
    #[arg(long)]
    shuffle_seed: Option<u64>,
    /// Simulated milliseconds advanced per tick.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
    /// Upper bound on the number of ticks before the session gives up.
    #[arg(long)]
    max_ticks: Option<u64>,
    /// Milliseconds a shot needs to reach its target.
    #[arg(long, default_value_t = 300)]
    travel_ms: u64,
    /// Never reports shot arrivals, leaving every shot to the fire timeout.
    #[arg(long)]
    drop_completions: bool,
    /// Slots kept free for agents that match a front token.
    #[arg(long, default_value_t = 1)]
    reserved_slots: usize,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct LevelSource {
    /// JSON level file to play.
    #[arg(long, value_name = "FILE")]
    level: Option<PathBuf>,
    /// Level code to play.
    #[arg(long, value_name = "CODE")]
    level_code: Option<String>,
    /// Campaign seed of a generated level.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Args)]
struct GeneratorArgs {
    /// Index of the generated level within its campaign.
    #[arg(long, default_value_t = 0)]
    level_index: u32,
    /// Number of lanes of a generated level.
    #[arg(long, default_value_t = 6)]
    columns: u32,
    /// Number of rows of a generated level.
    #[arg(long, default_value_t = 8)]
    rows: u32,
    /// Number of colors used by a generated level.
    #[arg(long, default_value_t = 4)]
    palette: usize,
}

impl GeneratorArgs {
    fn generate(&self, seed: u64) -> Result<LevelSnapshot> {
        let config = GeneratorConfig {
            columns: self.columns,
            rows: self.rows,
            palette: self.palette,
            seed,
        };
        LevelGeneration::new()
            .generate(&config, self.level_index)
            .with_context(|| format!("failed to generate level {}", self.level_index))
    }
}

/// Entry point for the Color Drain command-line interface.
fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play(args) => play(args),
        Commands::Generate {
            seed,
            generator,
            code,
        } => {
            let snapshot = generator.generate(seed)?;
            print_level(&snapshot, code)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Encode { level } => {
            let snapshot = files::load_level(&level)?;
            print_level(&snapshot, true)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Decode { code } => {
            let snapshot = level_transfer::decode(&code).context("failed to decode level code")?;
            print_level(&snapshot, false)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn play(args: PlayArgs) -> Result<ExitCode> {
    let snapshot = match (&args.source.level, &args.source.level_code, args.source.seed) {
        (Some(path), _, _) => files::load_level(path)?,
        (None, Some(code), _) => {
            level_transfer::decode(code).context("failed to decode level code")?
        }
        (None, None, Some(seed)) => args.generator.generate(seed)?,
        (None, None, None) => anyhow::bail!("no level source was provided"),
    };

    let mut puzzle = match &args.config {
        Some(path) => files::load_config(path)?,
        None => PuzzleConfig::default(),
    };
    if args.shuffle_seed.is_some() {
        puzzle.staging_shuffle_seed = args.shuffle_seed;
    }

    let defaults = SessionSettings::default();
    let settings = SessionSettings {
        tick: Duration::from_millis(args.tick_ms.max(1)),
        max_ticks: args.max_ticks.unwrap_or(defaults.max_ticks),
        travel: Duration::from_millis(args.travel_ms),
        drop_completions: args.drop_completions,
        reserved_slots: args.reserved_slots,
    };

    let summary = session::play(puzzle, snapshot, &settings);
    print_summary(&summary);

    Ok(match summary.outcome {
        Outcome::Cleared => ExitCode::SUCCESS,
        Outcome::Rejected(_) => ExitCode::from(2),
        Outcome::GameOver | Outcome::Stranded | Outcome::OutOfTicks => ExitCode::FAILURE,
    })
}

fn print_level(snapshot: &LevelSnapshot, as_code: bool) -> Result<()> {
    if as_code {
        println!(
            "{}",
            level_transfer::encode(snapshot).context("failed to encode level")?
        );
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(snapshot).context("failed to serialise level")?
        );
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("outcome:     {}", summary.outcome);
    println!("ticks:       {}", summary.ticks);
    println!("elapsed:     {:.2}s", summary.elapsed.as_secs_f64());
    println!("dispatched:  {}", summary.dispatched);
    println!(
        "shots:       {} ({} timed out, {} cancelled)",
        summary.shots, summary.timeouts, summary.cancelled
    );
    println!("merges:      {}", summary.merges);
    println!("tiles left:  {}", summary.tiles_left);
}
