//! Append-only score ledger and the per-user aggregates derived from it.
//!
//! Every point change goes through [`record_event_in`], which writes the
//! ledger row and the aggregate increment inside the caller's transaction.
//! Write paths open with the user upsert, so SQLite's write lock is held
//! before anything is read back.

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::badges::{self, BadgeId};
use crate::error::{require_user_id, LeaderboardError, Result};
use crate::models::{ActivityKind, AggregateStats, PointWindow, ScoreEvent, User};
use crate::policy;

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event_id: String,
    pub total_points: i64,
    pub level: i64,
    pub badges_unlocked: Vec<BadgeId>,
}

#[derive(Debug, Clone)]
pub struct QuizStatsOutcome {
    pub passed: bool,
    pub total_quizzes: i64,
    pub correct_answers: i64,
    pub badges_unlocked: Vec<BadgeId>,
}

/// Display name for users created without one: `user_alex_001` becomes `User 001`.
pub fn default_display_name(user_id: &str) -> String {
    let suffix = user_id.rsplit('_').next().unwrap_or(user_id);
    format!("User {suffix}")
}

/// Get-or-create for the user row and its stats row.
///
/// An explicit `username` or `email` refreshes the stored value; `None` keeps
/// whatever is already there.
pub async fn ensure_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<()> {
    let user_id = require_user_id(user_id)?;
    let now = Utc::now();
    let initial_name = username
        .map(str::to_string)
        .unwrap_or_else(|| default_display_name(user_id));

    sqlx::query(
        r#"
        INSERT INTO users (user_id, username, email, joined_at, last_active)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE
        SET username = COALESCE(?, users.username),
            email = COALESCE(?, users.email),
            last_active = excluded.last_active
        "#,
    )
    .bind(user_id)
    .bind(&initial_name)
    .bind(email)
    .bind(now)
    .bind(now)
    .bind(username)
    .bind(email)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO leaderboard_stats (user_id, created_at, updated_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn initialize_user(
    pool: &SqlitePool,
    user_id: &str,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    ensure_user(&mut tx, user_id, username, email).await?;
    tx.commit().await?;
    info!(user_id, "user initialized");
    Ok(())
}

/// Appends a ledger event and applies it to the user's aggregates.
pub async fn record_event(
    pool: &SqlitePool,
    user_id: &str,
    kind: &ActivityKind,
    points: i64,
    detail: &str,
) -> Result<RecordedEvent> {
    let mut tx = pool.begin().await?;
    let recorded = record_event_in(&mut tx, user_id, kind, points, detail).await?;
    tx.commit().await?;
    Ok(recorded)
}

/// [`record_event`] on a transaction owned by the caller.
pub async fn record_event_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    kind: &ActivityKind,
    points: i64,
    detail: &str,
) -> Result<RecordedEvent> {
    let user_id = require_user_id(user_id)?;
    if points < 0 {
        return Err(LeaderboardError::validation(format!(
            "points_earned must be non-negative, got {points}"
        )));
    }

    ensure_user(conn, user_id, None, None).await?;

    let event_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO score_events (event_id, user_id, activity_kind, points_earned, detail, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event_id)
    .bind(user_id)
    .bind(kind.as_str())
    .bind(points)
    .bind(detail)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"
        UPDATE leaderboard_stats
        SET points = points + ?,
            weekly_points = weekly_points + ?,
            monthly_points = monthly_points + ?,
            level = (points + ?) / 100 + 1,
            updated_at = ?
        WHERE user_id = ?
        RETURNING points, level
        "#,
    )
    .bind(points)
    .bind(points)
    .bind(points)
    .bind(points)
    .bind(now)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let total_points: i64 = row.try_get("points")?;
    let level: i64 = row.try_get("level")?;
    let badges_unlocked = badges::award_badges(conn, user_id).await?;

    info!(
        user_id,
        kind = %kind,
        points,
        total_points,
        level,
        "points awarded"
    );

    Ok(RecordedEvent {
        event_id,
        total_points,
        level,
        badges_unlocked,
    })
}

pub async fn record_quiz_stats(
    pool: &SqlitePool,
    user_id: &str,
    score_percent: f64,
    max_score: f64,
    pass_ratio: f64,
) -> Result<QuizStatsOutcome> {
    let mut tx = pool.begin().await?;
    let outcome = record_quiz_stats_in(&mut tx, user_id, score_percent, max_score, pass_ratio).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Counts one quiz attempt; it is a correct answer when it clears the pass bar.
/// Points are untouched.
pub async fn record_quiz_stats_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    score_percent: f64,
    max_score: f64,
    pass_ratio: f64,
) -> Result<QuizStatsOutcome> {
    let user_id = require_user_id(user_id)?;
    if !(max_score > 0.0) {
        return Err(LeaderboardError::validation(format!(
            "max_score must be positive, got {max_score}"
        )));
    }

    ensure_user(conn, user_id, None, None).await?;

    let passed = policy::is_pass(score_percent, max_score, pass_ratio);
    let row = sqlx::query(
        r#"
        UPDATE leaderboard_stats
        SET total_quizzes = total_quizzes + 1,
            correct_answers = correct_answers + ?,
            updated_at = ?
        WHERE user_id = ?
        RETURNING total_quizzes, correct_answers
        "#,
    )
    .bind(i64::from(passed))
    .bind(Utc::now())
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let badges_unlocked = badges::award_badges(conn, user_id).await?;
    debug!(user_id, score_percent, passed, "quiz stats updated");

    Ok(QuizStatsOutcome {
        passed,
        total_quizzes: row.try_get("total_quizzes")?,
        correct_answers: row.try_get("correct_answers")?,
        badges_unlocked,
    })
}

/// Number of quiz events already in the user's ledger. Any kind starting with
/// `quiz` counts, as does `perfect_quiz`.
pub async fn count_quiz_events(conn: &mut SqliteConnection, user_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM score_events
         WHERE user_id = ? AND (activity_kind LIKE 'quiz%' OR activity_kind = ?)",
    )
    .bind(user_id)
    .bind(ActivityKind::PerfectQuiz.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Sets the externally maintained streak counter. The user must already exist.
pub async fn set_streak(pool: &SqlitePool, user_id: &str, streak: i64) -> Result<Vec<BadgeId>> {
    let mut tx = pool.begin().await?;
    let unlocked = set_streak_in(&mut tx, user_id, streak).await?;
    tx.commit().await?;
    Ok(unlocked)
}

/// [`set_streak`] on a transaction owned by the caller.
pub async fn set_streak_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    streak: i64,
) -> Result<Vec<BadgeId>> {
    let user_id = require_user_id(user_id)?;
    validate_streak(streak)?;

    let result = sqlx::query(
        "UPDATE leaderboard_stats SET streak = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(streak)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LeaderboardError::NotFound(format!("no stats for user {user_id}")));
    }

    let unlocked = badges::award_badges(conn, user_id).await?;
    info!(user_id, streak, "streak updated");
    Ok(unlocked)
}

pub fn validate_streak(streak: i64) -> Result<()> {
    if streak < 0 {
        return Err(LeaderboardError::validation(format!(
            "streak must be non-negative, got {streak}"
        )));
    }
    Ok(())
}

/// Zeroes one windowed counter for every user. `points` is left alone.
pub async fn reset_window(pool: &SqlitePool, window: PointWindow) -> Result<u64> {
    let query = format!(
        "UPDATE leaderboard_stats SET {column} = 0, updated_at = ? WHERE {column} != 0",
        column = window.column()
    );
    let result = sqlx::query(&query).bind(Utc::now()).execute(pool).await?;
    info!(window = window.column(), users = result.rows_affected(), "point window reset");
    Ok(result.rows_affected())
}

pub async fn fetch_user(pool: &SqlitePool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT user_id, username, email, joined_at, last_active FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| -> Result<User> {
        Ok(User {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            joined_at: row.try_get("joined_at")?,
            last_active: row.try_get("last_active")?,
        })
    })
    .transpose()
}

pub async fn fetch_stats(pool: &SqlitePool, user_id: &str) -> Result<Option<AggregateStats>> {
    let mut conn = pool.acquire().await?;
    load_stats(&mut conn, user_id).await
}

pub async fn load_stats(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<AggregateStats>> {
    let row = sqlx::query(
        r#"
        SELECT points, level, streak, total_quizzes, correct_answers,
               weekly_points, monthly_points, previous_rank
        FROM leaderboard_stats
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let badges = badges::badges_for_user(conn, user_id).await?;
    let previous_rank: i64 = row.try_get("previous_rank")?;

    Ok(Some(AggregateStats {
        points: row.try_get("points")?,
        level: row.try_get("level")?,
        streak: row.try_get("streak")?,
        total_quizzes: row.try_get("total_quizzes")?,
        correct_answers: row.try_get("correct_answers")?,
        weekly_points: row.try_get("weekly_points")?,
        monthly_points: row.try_get("monthly_points")?,
        previous_rank: (previous_rank > 0).then_some(previous_rank),
        badges: badges.iter().map(|badge| badge.id().to_string()).collect(),
    }))
}

/// Most recent ledger events for a user, newest first.
pub async fn events_for_user(pool: &SqlitePool, user_id: &str, limit: u32) -> Result<Vec<ScoreEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT event_id, user_id, activity_kind, points_earned, detail, occurred_at
        FROM score_events
        WHERE user_id = ?
        ORDER BY occurred_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(score_event_from_row).collect()
}

/// Most recent ledger events across all users, newest first.
pub async fn recent_events(pool: &SqlitePool, limit: u32) -> Result<Vec<ScoreEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT event_id, user_id, activity_kind, points_earned, detail, occurred_at
        FROM score_events
        ORDER BY occurred_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(score_event_from_row).collect()
}

fn score_event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScoreEvent> {
    let kind: String = row.try_get("activity_kind")?;
    Ok(ScoreEvent {
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        activity_kind: ActivityKind::from(kind),
        points_earned: row.try_get("points_earned")?,
        detail: row.try_get("detail")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

/// Sum of every ledger entry for the user.
#[cfg(test)]
pub async fn ledger_total(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(points_earned), 0) FROM score_events WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(total)
}
