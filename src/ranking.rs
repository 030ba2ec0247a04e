use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::badges;
use crate::error::{require_user_id, LeaderboardError, Result};
use crate::models::{
    average_score, round_one_decimal, AggregateStats, Category, LeaderboardStats, TimeWindow,
    UserRankEntry,
};

const ENTRY_COLUMNS: &str = r#"
    u.user_id, u.username, u.email, u.joined_at,
    s.points, s.level, s.streak, s.total_quizzes, s.correct_answers,
    s.weekly_points, s.monthly_points, s.previous_rank
"#;

/// Users ordered by the category's column, highest first. Ties keep the order
/// in which the users' stats rows were created.
///
/// `window` is accepted for the caller's benefit; it does not filter rows.
pub async fn get_leaderboard(
    pool: &SqlitePool,
    limit: u32,
    window: TimeWindow,
    category: Category,
) -> Result<Vec<UserRankEntry>> {
    if limit == 0 {
        return Err(LeaderboardError::validation("limit must be at least 1"));
    }
    debug!(limit, window = window.as_str(), category = category.as_str(), "fetching leaderboard");

    let query = format!(
        "SELECT {ENTRY_COLUMNS}
         FROM users u
         JOIN leaderboard_stats s ON s.user_id = u.user_id
         ORDER BY s.{column} DESC, s.id ASC
         LIMIT ?",
        column = category.sort_column()
    );

    let mut conn = pool.acquire().await?;
    let rows = sqlx::query(&query)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        let rank = position as i64 + 1;
        entries.push(entry_from_row(&mut conn, row, rank).await?);
    }

    Ok(entries)
}

/// The user's entry with `rank = 1 + number of users strictly ahead`, over
/// every user regardless of any leaderboard limit.
pub async fn get_user_rank(
    pool: &SqlitePool,
    user_id: &str,
    category: Category,
) -> Result<Option<UserRankEntry>> {
    let user_id = require_user_id(user_id)?;
    let query = format!(
        "SELECT {ENTRY_COLUMNS},
                (SELECT COUNT(*) + 1 FROM leaderboard_stats s2
                  WHERE s2.{column} > s.{column}) AS current_rank
         FROM users u
         JOIN leaderboard_stats s ON s.user_id = u.user_id
         WHERE u.user_id = ?",
        column = category.sort_column()
    );

    let mut conn = pool.acquire().await?;
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let rank: i64 = row.try_get("current_rank")?;
            Ok(Some(entry_from_row(&mut conn, &row, rank).await?))
        }
        None => Ok(None),
    }
}

pub async fn get_leaderboard_stats(pool: &SqlitePool) -> Result<LeaderboardStats> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_users,
               COALESCE(SUM(points), 0) AS total_points,
               COALESCE(MAX(streak), 0) AS max_streak
        FROM leaderboard_stats
        "#,
    )
    .fetch_one(pool)
    .await?;

    let total_users: i64 = row.try_get("total_users")?;
    let total_points: i64 = row.try_get("total_points")?;
    let max_streak: i64 = row.try_get("max_streak")?;

    let top_streak_username: Option<String> = sqlx::query_scalar(
        r#"
        SELECT u.username
        FROM users u
        JOIN leaderboard_stats s ON s.user_id = u.user_id
        ORDER BY s.streak DESC, s.id ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    // strftime('%w') numbers days from Sunday = 0.
    let busiest_day: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT CAST(strftime('%w', substr(occurred_at, 1, 10)) AS INTEGER) AS weekday
        FROM score_events
        GROUP BY weekday
        ORDER BY COUNT(*) DESC, weekday ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let average_points = if total_users > 0 {
        round_one_decimal(total_points as f64 / total_users as f64)
    } else {
        0.0
    };

    Ok(LeaderboardStats {
        total_users,
        average_points,
        max_streak,
        top_streak_username: top_streak_username.unwrap_or_else(|| "N/A".to_string()),
        most_active_day: busiest_day
            .and_then(weekday_name)
            .unwrap_or("N/A")
            .to_string(),
    })
}

/// Stores every user's current rank in `previous_rank` for rank-delta display.
pub async fn snapshot_ranks(pool: &SqlitePool, category: Category) -> Result<u64> {
    let query = format!(
        "UPDATE leaderboard_stats
         SET previous_rank = (SELECT COUNT(*) + 1 FROM leaderboard_stats s2
                               WHERE s2.{column} > leaderboard_stats.{column})",
        column = category.sort_column()
    );
    let result = sqlx::query(&query).execute(pool).await?;
    info!(category = category.as_str(), users = result.rows_affected(), "rank snapshot taken");
    Ok(result.rows_affected())
}

fn weekday_name(days_from_sunday: i64) -> Option<&'static str> {
    const NAMES: [&str; 7] = [
        "Sunday",
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
    ];
    usize::try_from(days_from_sunday)
        .ok()
        .and_then(|index| NAMES.get(index).copied())
}

async fn entry_from_row(
    conn: &mut SqliteConnection,
    row: &SqliteRow,
    rank: i64,
) -> Result<UserRankEntry> {
    let user_id: String = row.try_get("user_id")?;
    let correct_answers: i64 = row.try_get("correct_answers")?;
    let total_quizzes: i64 = row.try_get("total_quizzes")?;
    let previous_rank: i64 = row.try_get("previous_rank")?;
    let badges = badges::badges_for_user(conn, &user_id).await?;

    Ok(UserRankEntry {
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        joined_at: row.try_get("joined_at")?,
        rank,
        average_score: average_score(correct_answers, total_quizzes),
        stats: AggregateStats {
            points: row.try_get("points")?,
            level: row.try_get("level")?,
            streak: row.try_get("streak")?,
            total_quizzes,
            correct_answers,
            weekly_points: row.try_get("weekly_points")?,
            monthly_points: row.try_get("monthly_points")?,
            previous_rank: (previous_rank > 0).then_some(previous_rank),
            badges: badges.iter().map(|badge| badge.id().to_string()).collect(),
        },
        user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::ledger;
    use crate::models::ActivityKind;

    async fn seed_points(pool: &SqlitePool, users: &[(&str, i64)]) {
        for (user_id, points) in users {
            ledger::record_event(pool, user_id, &ActivityKind::SampleData, *points, "")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn leaderboard_sorts_truncates_and_ranks() {
        let pool = test_pool().await;
        seed_points(&pool, &[("user_a", 300), ("user_b", 100), ("user_c", 200)]).await;

        let entries = get_leaderboard(&pool, 2, TimeWindow::All, Category::Points)
            .await
            .unwrap();
        let ranked: Vec<(&str, i64, i64)> = entries
            .iter()
            .map(|e| (e.user_id.as_str(), e.stats.points, e.rank))
            .collect();
        assert_eq!(ranked, vec![("user_a", 300, 1), ("user_c", 200, 2)]);
    }

    #[tokio::test]
    async fn ties_keep_creation_order() {
        let pool = test_pool().await;
        seed_points(&pool, &[("late_z", 50), ("early_a", 50), ("mid_m", 80)]).await;

        let entries = get_leaderboard(&pool, 10, TimeWindow::All, Category::Points)
            .await
            .unwrap();
        let order: Vec<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["mid_m", "late_z", "early_a"]);
    }

    #[tokio::test]
    async fn user_rank_matches_full_leaderboard_in_every_category() {
        let pool = test_pool().await;
        seed_points(&pool, &[("u1", 120), ("u2", 480), ("u3", 120), ("u4", 15)]).await;
        for (user_id, quizzes) in [("u1", 3), ("u3", 5), ("u4", 1)] {
            for _ in 0..quizzes {
                ledger::record_quiz_stats(&pool, user_id, 85.0, 100.0, 0.8).await.unwrap();
            }
        }
        ledger::set_streak(&pool, "u4", 9).await.unwrap();
        ledger::set_streak(&pool, "u2", 2).await.unwrap();
        ledger::reset_window(&pool, crate::models::PointWindow::Weekly).await.unwrap();
        ledger::record_event(&pool, "u4", &ActivityKind::General, 30, "").await.unwrap();

        for category in Category::ALL {
            let all = get_leaderboard(&pool, 100, TimeWindow::All, category).await.unwrap();
            let values: Vec<i64> = all.iter().map(|e| column_value(e, category)).collect();

            for entry in &all {
                let ranked = get_user_rank(&pool, &entry.user_id, category)
                    .await
                    .unwrap()
                    .unwrap();
                let mine = column_value(entry, category);
                let ahead = values.iter().filter(|v| **v > mine).count() as i64;
                assert_eq!(ranked.rank, ahead + 1, "{category:?} {}", entry.user_id);
                // Competition rank never exceeds the dense position.
                assert!(ranked.rank <= entry.rank);
            }
        }
    }

    fn column_value(entry: &UserRankEntry, category: Category) -> i64 {
        match category {
            Category::Points => entry.stats.points,
            Category::Weekly => entry.stats.weekly_points,
            Category::Monthly => entry.stats.monthly_points,
            Category::Quizzes => entry.stats.total_quizzes,
            Category::Streak => entry.stats.streak,
        }
    }

    #[tokio::test]
    async fn user_rank_ignores_limit_and_handles_unknown_users() {
        let pool = test_pool().await;
        seed_points(&pool, &[("u1", 300), ("u2", 200), ("u3", 100)]).await;

        let top = get_leaderboard(&pool, 1, TimeWindow::All, Category::Points).await.unwrap();
        assert_eq!(top.len(), 1);

        let third = get_user_rank(&pool, "u3", Category::Points).await.unwrap().unwrap();
        assert_eq!(third.rank, 3);
        assert!(get_user_rank(&pool, "nobody", Category::Points).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn time_window_does_not_filter() {
        let pool = test_pool().await;
        seed_points(&pool, &[("u1", 10), ("u2", 20)]).await;
        ledger::reset_window(&pool, crate::models::PointWindow::Monthly).await.unwrap();

        let all = get_leaderboard(&pool, 10, TimeWindow::All, Category::Points).await.unwrap();
        let monthly = get_leaderboard(&pool, 10, TimeWindow::Monthly, Category::Points)
            .await
            .unwrap();
        assert_eq!(all.len(), monthly.len());
        assert_eq!(monthly[0].user_id, "u2");
    }

    #[tokio::test]
    async fn average_score_reflects_quiz_record() {
        let pool = test_pool().await;
        for score in [90.0, 50.0, 85.0] {
            ledger::record_quiz_stats(&pool, "u1", score, 100.0, 0.8).await.unwrap();
        }
        let entry = get_user_rank(&pool, "u1", Category::Quizzes).await.unwrap().unwrap();
        assert_eq!(entry.average_score, 66.7);
        assert_eq!(entry.stats.badges, vec!["first_quiz".to_string()]);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let pool = test_pool().await;
        let err = get_leaderboard(&pool, 0, TimeWindow::All, Category::Points)
            .await
            .unwrap_err();
        assert!(matches!(err, LeaderboardError::Validation(_)));
    }

    #[tokio::test]
    async fn stats_over_empty_board_are_well_defined() {
        let pool = test_pool().await;
        let stats = get_leaderboard_stats(&pool).await.unwrap();
        assert_eq!(
            stats,
            LeaderboardStats {
                total_users: 0,
                average_points: 0.0,
                max_streak: 0,
                top_streak_username: "N/A".to_string(),
                most_active_day: "N/A".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn stats_summarise_the_board() {
        let pool = test_pool().await;
        ledger::initialize_user(&pool, "u1", Some("Alex Johnson"), None).await.unwrap();
        ledger::initialize_user(&pool, "u2", Some("Mike Rodriguez"), None).await.unwrap();
        seed_points(&pool, &[("u1", 100), ("u2", 45)]).await;
        ledger::set_streak(&pool, "u2", 22).await.unwrap();

        let stats = get_leaderboard_stats(&pool).await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.average_points, 72.5);
        assert_eq!(stats.max_streak, 22);
        assert_eq!(stats.top_streak_username, "Mike Rodriguez");
        assert_ne!(stats.most_active_day, "N/A");
    }

    #[tokio::test]
    async fn snapshot_records_previous_rank() {
        let pool = test_pool().await;
        seed_points(&pool, &[("u1", 300), ("u2", 100)]).await;
        assert_eq!(snapshot_ranks(&pool, Category::Points).await.unwrap(), 2);

        ledger::record_event(&pool, "u2", &ActivityKind::General, 500, "").await.unwrap();
        let entry = get_user_rank(&pool, "u2", Category::Points).await.unwrap().unwrap();
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.stats.previous_rank, Some(2));
        assert_eq!(entry.rank_change(), Some(1));
    }

    #[test]
    fn weekday_names_start_on_sunday() {
        assert_eq!(weekday_name(0), Some("Sunday"));
        assert_eq!(weekday_name(1), Some("Monday"));
        assert_eq!(weekday_name(6), Some("Saturday"));
        assert_eq!(weekday_name(7), None);
    }
}
