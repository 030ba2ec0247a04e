use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;

mod badges;
mod config;
mod db;
mod error;
mod ledger;
mod models;
mod policy;
mod ranking;
mod report;
mod service;

use config::Config;
use models::{ActivityKind, Category, ContentType, PointWindow, TimeWindow};
use service::{
    ContentProcessedRequest, InitializeUserRequest, LeaderboardQuery, LeaderboardService,
    QuizScore, SubmitQuizRequest, UpdateEntryRequest,
};

#[derive(Parser)]
#[command(name = "learnboard")]
#[command(about = "Points, badges and leaderboards for the learning platform", long_about = None)]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the sample roster
    Seed,
    /// Import ledger events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Register a user or refresh their profile
    InitUser {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Show a user's points, level, badges and rank
    Stats {
        #[arg(long)]
        user_id: String,
    },
    /// Record a quiz result
    #[command(group(
        ArgGroup::new("result")
            .args(["score", "percent"])
            .required(true)
            .multiple(false)
    ))]
    SubmitQuiz {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        /// Score as a fraction between 0 and 1
        #[arg(long)]
        score: Option<f64>,
        /// Score as a percentage between 0 and 100
        #[arg(long)]
        percent: Option<f64>,
    },
    /// Award points for processed learning content
    Content {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, value_enum)]
        content_type: ContentType,
        /// Length of the extracted text in characters
        #[arg(long)]
        length: usize,
    },
    /// Show the leaderboard
    Leaderboard {
        #[arg(long, value_enum, default_value_t = Category::Points)]
        category: Category,
        #[arg(long, value_enum, default_value_t = TimeWindow::All)]
        window: TimeWindow,
        #[arg(long)]
        limit: Option<u32>,
        /// Highlight this user and include their rank
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Adjust a leaderboard entry by hand
    UpdateEntry {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 0)]
        points: i64,
        #[arg(long)]
        activity: Option<String>,
        /// Quiz score out of 100
        #[arg(long)]
        quiz_score: Option<f64>,
        #[arg(long)]
        streak: Option<i64>,
    },
    /// Store current ranks so the next leaderboard shows movement
    SnapshotRanks {
        #[arg(long, value_enum, default_value_t = Category::Points)]
        category: Category,
    },
    /// Zero the weekly or monthly point counters
    ResetWindow {
        #[arg(long, value_enum)]
        window: PointWindow,
    },
    /// Show a user's ledger, newest first
    History {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, value_enum, default_value_t = Category::Points)]
        category: Category,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long, default_value = "leaderboard.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    let pool = config
        .connect()
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    let service = LeaderboardService::new(pool, &config);

    match cli.command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Seed => {
            let populated = service.populate_sample_data().await?;
            println!("Seeded {} users with {} ledger events.", populated.users, populated.events);
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(service.pool(), &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Imported {inserted} events from {}.", csv.display());
        }
        Commands::InitUser {
            user_id,
            username,
            email,
        } => {
            let response = service
                .initialize_user(InitializeUserRequest {
                    user_id,
                    username,
                    email,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Stats { user_id } => {
            print_json(&service.user_stats(&user_id).await?)?;
        }
        Commands::SubmitQuiz {
            user_id,
            username,
            score,
            percent,
        } => {
            let score = match (score, percent) {
                (Some(fraction), _) => QuizScore::Fraction(fraction),
                (None, Some(percent)) => QuizScore::Percent(percent),
                (None, None) => anyhow::bail!("either --score or --percent is required"),
            };
            let response = service
                .submit_quiz(SubmitQuizRequest {
                    user_id,
                    username,
                    score,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Content {
            user_id,
            username,
            content_type,
            length,
        } => {
            let response = service
                .report_content(ContentProcessedRequest {
                    user_id,
                    username,
                    content_type,
                    content_length: length,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Leaderboard {
            category,
            window,
            limit,
            user_id,
        } => {
            let response = service
                .leaderboard(LeaderboardQuery {
                    limit,
                    window,
                    category,
                    user_id,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::UpdateEntry {
            user_id,
            username,
            email,
            points,
            activity,
            quiz_score,
            streak,
        } => {
            let response = service
                .update_entry(UpdateEntryRequest {
                    user_id,
                    username,
                    email,
                    points_earned: points,
                    activity_kind: activity.map(ActivityKind::from),
                    quiz_score,
                    streak,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::SnapshotRanks { category } => {
            let users = ranking::snapshot_ranks(service.pool(), category).await?;
            println!("Stored {} ranks for {users} users.", category.as_str());
        }
        Commands::ResetWindow { window } => {
            let users = ledger::reset_window(service.pool(), window).await?;
            println!("Reset {} for {users} users.", window.column());
        }
        Commands::History { user_id, limit } => {
            let events = ledger::events_for_user(service.pool(), &user_id, limit).await?;
            print_json(&events)?;
        }
        Commands::Report {
            category,
            limit,
            out,
        } => {
            let stats = ranking::get_leaderboard_stats(service.pool()).await?;
            let entries =
                ranking::get_leaderboard(service.pool(), limit, TimeWindow::All, category).await?;
            let recent = ledger::recent_events(service.pool(), 50).await?;
            let report = report::build_report(category, &stats, &entries, &recent);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
