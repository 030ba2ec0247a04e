use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use crate::error::Result;
use crate::models::ActivityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeId {
    FirstQuiz,
    QuizMaster,
    PerfectQuiz,
    #[serde(rename = "streak_7")]
    Streak7,
    #[serde(rename = "points_100")]
    Points100,
    #[serde(rename = "points_500")]
    Points500,
    ContentCreator,
}

impl BadgeId {
    pub const CATALOGUE: [BadgeId; 7] = [
        BadgeId::FirstQuiz,
        BadgeId::QuizMaster,
        BadgeId::PerfectQuiz,
        BadgeId::Streak7,
        BadgeId::Points100,
        BadgeId::Points500,
        BadgeId::ContentCreator,
    ];

    pub fn id(self) -> &'static str {
        match self {
            BadgeId::FirstQuiz => "first_quiz",
            BadgeId::QuizMaster => "quiz_master",
            BadgeId::PerfectQuiz => "perfect_quiz",
            BadgeId::Streak7 => "streak_7",
            BadgeId::Points100 => "points_100",
            BadgeId::Points500 => "points_500",
            BadgeId::ContentCreator => "content_creator",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BadgeId::FirstQuiz => "Quiz Rookie",
            BadgeId::QuizMaster => "Quiz Master",
            BadgeId::PerfectQuiz => "Perfectionist",
            BadgeId::Streak7 => "Week Warrior",
            BadgeId::Points100 => "Century Club",
            BadgeId::Points500 => "High Achiever",
            BadgeId::ContentCreator => "Content Creator",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BadgeId::FirstQuiz => "Complete your first quiz",
            BadgeId::QuizMaster => "Complete 10 quizzes",
            BadgeId::PerfectQuiz => "Score 100% on a quiz",
            BadgeId::Streak7 => "7-day learning streak",
            BadgeId::Points100 => "Earn 100 points",
            BadgeId::Points500 => "Earn 500 points",
            BadgeId::ContentCreator => "Upload 5 learning materials",
        }
    }

    pub fn from_id(id: &str) -> Option<BadgeId> {
        Self::CATALOGUE.into_iter().find(|badge| badge.id() == id)
    }
}

/// Counters the unlock rules look at.
#[derive(Debug, Clone, Default)]
pub struct BadgeProgress {
    pub points: i64,
    pub streak: i64,
    pub total_quizzes: i64,
    pub perfect_quizzes: i64,
    pub content_events: i64,
}

pub fn qualifying_badges(progress: &BadgeProgress) -> Vec<BadgeId> {
    BadgeId::CATALOGUE
        .into_iter()
        .filter(|badge| match badge {
            BadgeId::FirstQuiz => progress.total_quizzes >= 1,
            BadgeId::QuizMaster => progress.total_quizzes >= 10,
            BadgeId::PerfectQuiz => progress.perfect_quizzes >= 1,
            BadgeId::Streak7 => progress.streak >= 7,
            BadgeId::Points100 => progress.points >= 100,
            BadgeId::Points500 => progress.points >= 500,
            BadgeId::ContentCreator => progress.content_events >= 5,
        })
        .collect()
}

async fn load_progress(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<BadgeProgress>> {
    let [pdf, text, url] = ActivityKind::CONTENT_KINDS;
    let row = sqlx::query(
        r#"
        SELECT s.points, s.streak, s.total_quizzes,
               (SELECT COUNT(*) FROM score_events e
                 WHERE e.user_id = s.user_id AND e.activity_kind = ?) AS perfect_quizzes,
               (SELECT COUNT(*) FROM score_events e
                 WHERE e.user_id = s.user_id AND e.activity_kind IN (?, ?, ?)) AS content_events
        FROM leaderboard_stats s
        WHERE s.user_id = ?
        "#,
    )
    .bind(ActivityKind::PerfectQuiz.as_str())
    .bind(pdf)
    .bind(text)
    .bind(url)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| -> Result<BadgeProgress> {
        Ok(BadgeProgress {
            points: row.try_get("points")?,
            streak: row.try_get("streak")?,
            total_quizzes: row.try_get("total_quizzes")?,
            perfect_quizzes: row.try_get("perfect_quizzes")?,
            content_events: row.try_get("content_events")?,
        })
    })
    .transpose()
}

/// Inserts achievements for every rule the user now satisfies and returns the
/// ones that were not held before. Earned badges are never revoked.
pub async fn award_badges(conn: &mut SqliteConnection, user_id: &str) -> Result<Vec<BadgeId>> {
    let Some(progress) = load_progress(conn, user_id).await? else {
        return Ok(Vec::new());
    };

    let now = Utc::now();
    let mut unlocked = Vec::new();

    for badge in qualifying_badges(&progress) {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO achievements (user_id, badge_id, earned_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(badge.id())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            info!(user_id, badge = badge.id(), "badge unlocked");
            unlocked.push(badge);
        }
    }

    Ok(unlocked)
}

/// Badges held by the user, in catalogue order.
pub async fn badges_for_user(conn: &mut SqliteConnection, user_id: &str) -> Result<Vec<BadgeId>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT badge_id FROM achievements WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut badges: Vec<BadgeId> = ids.iter().filter_map(|id| BadgeId::from_id(id)).collect();
    badges.sort_by_key(|badge| BadgeId::CATALOGUE.iter().position(|b| b == badge));
    Ok(badges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::ledger;

    #[test]
    fn rules_follow_thresholds() {
        assert!(qualifying_badges(&BadgeProgress::default()).is_empty());

        let progress = BadgeProgress {
            points: 520,
            streak: 6,
            total_quizzes: 1,
            perfect_quizzes: 0,
            content_events: 5,
        };
        assert_eq!(
            qualifying_badges(&progress),
            vec![
                BadgeId::FirstQuiz,
                BadgeId::Points100,
                BadgeId::Points500,
                BadgeId::ContentCreator
            ]
        );
    }

    #[test]
    fn ids_round_trip_through_the_catalogue() {
        for badge in BadgeId::CATALOGUE {
            assert_eq!(BadgeId::from_id(badge.id()), Some(badge));
        }
        assert_eq!(BadgeId::from_id("social_learner"), None);
        assert_eq!(
            serde_json::to_string(&BadgeId::Streak7).unwrap(),
            "\"streak_7\""
        );
    }

    #[tokio::test]
    async fn badges_unlock_once() {
        let pool = test_pool().await;

        let first = ledger::record_event(&pool, "u1", &ActivityKind::General, 150, "")
            .await
            .unwrap();
        assert_eq!(first.badges_unlocked, vec![BadgeId::Points100]);

        let second = ledger::record_event(&pool, "u1", &ActivityKind::General, 10, "")
            .await
            .unwrap();
        assert!(second.badges_unlocked.is_empty());

        let perfect = ledger::record_event(&pool, "u1", &ActivityKind::PerfectQuiz, 25, "")
            .await
            .unwrap();
        assert_eq!(perfect.badges_unlocked, vec![BadgeId::PerfectQuiz]);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            badges_for_user(&mut conn, "u1").await.unwrap(),
            vec![BadgeId::PerfectQuiz, BadgeId::Points100]
        );
    }

    #[tokio::test]
    async fn content_creator_needs_five_uploads() {
        let pool = test_pool().await;
        for i in 0..5 {
            let recorded = ledger::record_event(&pool, "u1", &ActivityKind::TextProcessed, 15, "")
                .await
                .unwrap();
            if i < 4 {
                assert!(!recorded.badges_unlocked.contains(&BadgeId::ContentCreator));
            } else {
                assert!(recorded.badges_unlocked.contains(&BadgeId::ContentCreator));
            }
        }
    }
}
