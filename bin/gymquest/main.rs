//! GymQuest CLI
//!
//! Drives the progression engine against a local SQLite database.

mod style;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use gymquest::{
    ChallengeCatalog, ChallengeView, EngineConfig, ExerciseCanonicalizer, ProgressionEngine,
    SqliteStore, SystemClock, WorkoutEvent, WorkoutSet,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use style::*;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "gymquest")]
#[command(about = "GymQuest progression engine - XP, streaks, records and dungeons")]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "gymquest.db", env = "GYMQUEST_DB")]
    db: PathBuf,

    /// Engine config (TOML); defaults apply when omitted
    #[arg(long, env = "GYMQUEST_CONFIG")]
    config: Option<PathBuf>,

    /// Dungeon catalog (JSON array of definitions); built-in when omitted
    #[arg(long, env = "GYMQUEST_CATALOG")]
    catalog: Option<PathBuf>,

    /// User to act as
    #[arg(short, long, env = "GYMQUEST_USER")]
    user: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show level, rank, streak and lifetime totals
    Status,
    /// Credit XP directly
    Award {
        xp: u64,
        /// Activity date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Submit a workout from a JSON file
    Workout { file: PathBuf },
    /// Resolve an exercise name to its canonical group
    Canonicalize { name: String },
    /// Current bests for an exercise
    Bests { exercise: String },
    /// Roll for a new dungeon
    Spawn {
        /// Skip the spawn-chance roll
        #[arg(long)]
        force: bool,
    },
    /// List dungeons
    Challenges,
    Accept { id: Uuid },
    Abandon { id: Uuid },
    Claim { id: Uuid },
    /// Persist expiry for overdue dungeons
    Expire,
}

/// Workout file layout; `performed_at` defaults to now
#[derive(Debug, Deserialize)]
struct WorkoutFile {
    performed_at: Option<DateTime<Utc>>,
    sets: Vec<WorkoutSet>,
}

fn load_workout(path: &Path) -> Result<WorkoutEvent> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workout file {}", path.display()))?;
    let file: WorkoutFile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid workout file {}", path.display()))?;
    Ok(WorkoutEvent::new(
        file.performed_at.unwrap_or_else(Utc::now),
        file.sets,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_challenge(view: &ChallengeView) {
    let inst = &view.instance;
    print_section(&format!("{} [{}-rank]", inst.name, inst.rank));
    print_key_value("Id", &inst.id.to_string());
    print_key_value_colored(
        "Status",
        view.effective_status.as_str(),
        status_color(view.effective_status),
    );
    if view.effective_status.is_open() {
        let hours = view.seconds_remaining / 3600;
        let minutes = (view.seconds_remaining % 3600) / 60;
        print_key_value("Time left", &format!("{}h {}m", hours, minutes));
    }
    for objective in &inst.objectives {
        let target = objective.objective.target;
        let label = format!(
            "{}{}",
            objective.objective.id,
            if objective.objective.required { "" } else { " (optional)" }
        );
        print_key_value(
            &label,
            &format!(
                "{} {}/{}",
                progress_bar(objective.progress / target, 20),
                objective.progress,
                target
            ),
        );
    }
    let reward = inst.earned_reward.unwrap_or_else(|| inst.compute_reward());
    print_key_value("Reward", &format!("{} XP", reward));
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("Failed to open database {}", cli.db.display()))?;
    let engine = match &cli.catalog {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog {}", path.display()))?;
            ProgressionEngine::with_catalogs(
                config,
                Arc::new(store),
                Arc::new(SystemClock),
                ExerciseCanonicalizer::standard(),
                ChallengeCatalog::from_json(&raw)?,
            )?
        }
        None => ProgressionEngine::new(config, Arc::new(store), Arc::new(SystemClock))?,
    };
    let user = cli.user.as_str();

    match cli.command {
        Command::Status => {
            let state = engine.progression(user)?;
            let progress = engine.level_progress(user)?;
            if cli.json {
                return print_json(&state);
            }
            print_header(&format!("{} - Level {}", user, state.level));
            print_key_value_colored("Rank", state.rank.as_str(), rank_color(state.rank));
            print_key_value("Total XP", &state.total_xp.to_string());
            print_key_value(
                "Next level",
                &format!(
                    "{} {:.1}% ({} XP to go)",
                    progress_bar(progress.percent / 100.0, 24),
                    progress.percent,
                    progress.xp_for_next
                ),
            );
            print_key_value(
                "Streak",
                &format!(
                    "{} days (best {})",
                    state.current_streak, state.longest_streak
                ),
            );
            print_key_value("Workouts", &state.total_workouts.to_string());
            print_key_value("Volume", &format!("{:.0}", state.total_volume));
            print_key_value("PRs", &state.total_prs.to_string());
        }
        Command::Award { xp, date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let award = engine.award_xp(user, xp, date)?;
            if cli.json {
                return print_json(&award);
            }
            print_success(&format!("+{} XP ({} total)", xp, award.total_xp));
            if award.streak_bonus > 0 {
                print_info(&format!("Streak bonus +{} XP", award.streak_bonus));
            }
            if award.leveled_up {
                print_info(&format!("Level up! {} -> {}", award.old_level, award.new_level));
            }
            if award.rank_changed {
                print_info(&format!("Rank up! {} -> {}", award.old_rank, award.new_rank));
            }
        }
        Command::Workout { file } => {
            let event = load_workout(&file)?;
            let outcome = engine.submit_workout(user, event)?;
            if cli.json {
                return print_json(&outcome);
            }
            print_header("Workout logged");
            print_key_value("XP", &outcome.xp.total.to_string());
            print_key_value("Volume", &format!("{:.0}", outcome.xp.total_volume));
            print_key_value("Streak", &outcome.award.current_streak.to_string());
            for record in &outcome.records {
                print_success(&format!(
                    "New {} record on {}: {:.1}",
                    record.kind.as_str(),
                    record.group_id,
                    record.value
                ));
            }
            if outcome.award.leveled_up {
                print_info(&format!(
                    "Level up! {} -> {}",
                    outcome.award.old_level, outcome.award.new_level
                ));
            }
            for id in &outcome.progressed_challenges {
                print_info(&format!("Dungeon {} progressed", id));
            }
        }
        Command::Canonicalize { name } => {
            let group = engine.canonicalize(&name);
            if cli.json {
                return print_json(&group);
            }
            println!("{}", group);
        }
        Command::Bests { exercise } => {
            let group = engine.canonicalize(&exercise);
            let bests = engine.current_bests(user, &group)?;
            if cli.json {
                return print_json(&bests);
            }
            print_header(&format!("Bests: {}", group));
            print_key_value("Estimated 1RM", &format!("{:.1}", bests.estimated_max));
            for (bucket, reps) in &bests.rep_max_by_bucket {
                print_key_value(
                    &format!("@ {:.1}", *bucket as f64 * bests.bucket_size),
                    &format!("{} reps", reps),
                );
            }
        }
        Command::Spawn { force } => match engine.maybe_spawn(user, force)? {
            Some(instance) => {
                if cli.json {
                    return print_json(&instance);
                }
                print_success("A gate has opened!");
                print_challenge(&instance.view(Utc::now()));
            }
            None => print_info("No gate this time"),
        },
        Command::Challenges => {
            let views = engine.list_challenges(user)?;
            if cli.json {
                return print_json(&views);
            }
            print_header("Dungeons");
            if views.is_empty() {
                print_info("No dungeons yet");
            }
            for view in &views {
                print_challenge(view);
            }
        }
        Command::Accept { id } => {
            let view = engine.accept_challenge(user, id)?;
            if cli.json {
                return print_json(&view);
            }
            print_success(&format!("Entered {}", view.instance.name));
        }
        Command::Abandon { id } => {
            let view = engine.abandon_challenge(user, id)?;
            if cli.json {
                return print_json(&view);
            }
            print_success(&format!("Left {}", view.instance.name));
        }
        Command::Claim { id } => {
            let outcome = engine.claim_challenge(user, id)?;
            if cli.json {
                return print_json(&outcome);
            }
            print_success(&format!(
                "Claimed {}: +{} XP",
                outcome.instance.name, outcome.reward
            ));
            if outcome.award.leveled_up {
                print_info(&format!(
                    "Level up! {} -> {}",
                    outcome.award.old_level, outcome.award.new_level
                ));
            }
        }
        Command::Expire => {
            let expired = engine.expire_stale(user)?;
            if cli.json {
                return print_json(&expired);
            }
            print_info(&format!("{} dungeons expired", expired));
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gymquest=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Using database {}", cli.db.display());

    if let Err(e) = run(cli) {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
