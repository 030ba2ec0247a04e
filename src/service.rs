//! Request/response contracts for the leaderboard operations.
//!
//! `LeaderboardService` owns the pool and the scoring rules; callers build it
//! once from [`Config`] and pass it to whatever front end serves requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::badges::BadgeId;
use crate::config::Config;
use crate::error::{require_user_id, LeaderboardError, Result};
use crate::ledger;
use crate::models::{
    ActivityKind, Category, ContentType, LeaderboardStats, TimeWindow, UserRankEntry,
};
use crate::policy::{self, PointsPolicy};
use crate::ranking;

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeUserRequest {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeUserResponse {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatsResponse {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub total_points: i64,
    pub level: i64,
    pub streak_days: i64,
    pub badges: Vec<BadgeView>,
    pub badges_earned: usize,
    pub current_rank: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeView {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

impl From<BadgeId> for BadgeView {
    fn from(badge: BadgeId) -> Self {
        Self {
            id: badge.id(),
            name: badge.name(),
            description: badge.description(),
        }
    }
}

/// A quiz result as reported by the quiz front end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum QuizScore {
    /// `0.0..=1.0`
    Fraction(f64),
    /// `0..=100`
    Percent(f64),
}

impl QuizScore {
    pub fn as_percent(self) -> f64 {
        match self {
            QuizScore::Fraction(fraction) => fraction * 100.0,
            QuizScore::Percent(percent) => percent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitQuizRequest {
    pub user_id: String,
    pub username: Option<String>,
    pub score: QuizScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitQuizResponse {
    pub event_id: String,
    pub points_earned: i64,
    pub activity_kind: ActivityKind,
    pub is_first_quiz: bool,
    pub passed: bool,
    pub total_points: i64,
    pub level: i64,
    pub total_quizzes: i64,
    pub correct_answers: i64,
    pub badges_unlocked: Vec<BadgeId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentProcessedRequest {
    pub user_id: String,
    pub username: Option<String>,
    pub content_type: ContentType,
    pub content_length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentProcessedResponse {
    pub event_id: String,
    pub points_awarded: i64,
    pub activity_kind: ActivityKind,
    pub total_points: i64,
    pub level: i64,
    pub badges_unlocked: Vec<BadgeId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub window: TimeWindow,
    #[serde(default)]
    pub category: Category,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    #[serde(flatten)]
    pub entry: UserRankEntry,
    pub is_current_user: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardResponse {
    pub category: Category,
    pub window: TimeWindow,
    pub entries: Vec<LeaderboardRow>,
    pub current_user: Option<UserRankEntry>,
    pub stats: LeaderboardStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEntryRequest {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub points_earned: i64,
    pub activity_kind: Option<ActivityKind>,
    /// Percentage score out of 100.
    pub quiz_score: Option<f64>,
    pub streak: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateEntryResponse {
    pub user: UserRankEntry,
    pub badges_unlocked: Vec<BadgeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulateResponse {
    pub users: usize,
    pub events: usize,
}

/// Seed roster: `(user_id, username, email, points, streak, quiz scores)`.
const SAMPLE_USERS: [(&str, &str, &str, i64, i64, &[f64]); 8] = [
    ("user_001", "Alex Johnson", "alex@example.com", 2450, 15, &[95.0, 88.0, 100.0, 92.0, 76.0, 90.0]),
    ("user_002", "Sarah Chen", "sarah@example.com", 2120, 8, &[85.0, 91.0, 78.0, 82.0, 64.0]),
    ("user_003", "Mike Rodriguez", "mike@example.com", 1890, 22, &[70.0, 84.0, 96.0, 61.0]),
    ("user_004", "Emma Wilson", "emma@example.com", 1650, 12, &[88.0, 72.0, 79.0, 93.0]),
    ("user_005", "David Kim", "david@example.com", 1420, 6, &[67.0, 81.0, 75.0]),
    ("user_006", "Lisa Zhang", "lisa@example.com", 980, 4, &[99.0, 83.0]),
    ("user_007", "Tom Smith", "tom@example.com", 640, 2, &[60.0, 74.0]),
    ("user_008", "Anna Garcia", "anna@example.com", 310, 1, &[86.0]),
];

pub struct LeaderboardService {
    pool: SqlitePool,
    policy: PointsPolicy,
    pass_ratio: f64,
    default_limit: u32,
}

impl LeaderboardService {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self {
            pool,
            policy: PointsPolicy::default(),
            pass_ratio: config.pass_ratio,
            default_limit: config.leaderboard_limit,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn initialize_user(
        &self,
        request: InitializeUserRequest,
    ) -> Result<InitializeUserResponse> {
        let user_id = require_user_id(&request.user_id)?;
        ledger::initialize_user(
            &self.pool,
            user_id,
            non_blank(request.username.as_deref()),
            non_blank(request.email.as_deref()),
        )
        .await?;

        let user = ledger::fetch_user(&self.pool, user_id)
            .await?
            .ok_or_else(|| LeaderboardError::NotFound(format!("user {user_id}")))?;

        Ok(InitializeUserResponse {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            joined_at: user.joined_at,
            last_active: user.last_active,
        })
    }

    /// Stats for a user, creating a zeroed record on first lookup.
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStatsResponse> {
        let user_id = require_user_id(user_id)?;
        if ledger::fetch_stats(&self.pool, user_id).await?.is_none() {
            ledger::initialize_user(&self.pool, user_id, None, None).await?;
        }

        let entry = self.rank_entry(user_id, Category::Points).await?;
        let badges: Vec<BadgeView> = entry
            .stats
            .badges
            .iter()
            .filter_map(|id| BadgeId::from_id(id))
            .map(BadgeView::from)
            .collect();

        Ok(UserStatsResponse {
            badges_earned: badges.len(),
            user_id: entry.user_id,
            username: entry.username,
            email: entry.email,
            total_points: entry.stats.points,
            level: entry.stats.level,
            streak_days: entry.stats.streak,
            badges,
            current_rank: entry.rank,
        })
    }

    /// Scores a quiz, applies the first-quiz bonus and counts the attempt, all
    /// in one transaction.
    pub async fn submit_quiz(&self, request: SubmitQuizRequest) -> Result<SubmitQuizResponse> {
        let user_id = require_user_id(&request.user_id)?;
        let score_percent = request.score.as_percent();

        let award = match request.score {
            QuizScore::Fraction(fraction) => self.policy.score_for_quiz(fraction),
            QuizScore::Percent(percent) => self.policy.score_for_quiz_percent(percent),
        };
        let (base_points, kind) = (award.points, award.kind);

        let mut tx = self.pool.begin().await?;
        ledger::ensure_user(&mut tx, user_id, non_blank(request.username.as_deref()), None).await?;

        let prior_quizzes = ledger::count_quiz_events(&mut tx, user_id).await?;
        let mut detail = policy::quiz_detail(score_percent);
        let (points, is_first_quiz) =
            self.policy
                .apply_first_quiz_bonus(base_points, &mut detail, prior_quizzes);

        let recorded = ledger::record_event_in(&mut tx, user_id, &kind, points, &detail).await?;
        let quiz = ledger::record_quiz_stats_in(&mut tx, user_id, score_percent, 100.0, self.pass_ratio)
            .await?;
        tx.commit().await?;

        info!(user_id, points, is_first_quiz, "quiz submitted");

        let mut badges_unlocked = recorded.badges_unlocked;
        badges_unlocked.extend(quiz.badges_unlocked);

        Ok(SubmitQuizResponse {
            event_id: recorded.event_id,
            points_earned: points,
            activity_kind: kind,
            is_first_quiz,
            passed: quiz.passed,
            total_points: recorded.total_points,
            level: recorded.level,
            total_quizzes: quiz.total_quizzes,
            correct_answers: quiz.correct_answers,
            badges_unlocked,
        })
    }

    pub async fn report_content(
        &self,
        request: ContentProcessedRequest,
    ) -> Result<ContentProcessedResponse> {
        let user_id = require_user_id(&request.user_id)?;
        let points = self
            .policy
            .score_for_content(request.content_type, request.content_length);
        let kind = request.content_type.activity_kind();
        let detail = policy::content_detail(request.content_type, request.content_length);

        let mut tx = self.pool.begin().await?;
        ledger::ensure_user(&mut tx, user_id, non_blank(request.username.as_deref()), None).await?;
        let recorded = ledger::record_event_in(&mut tx, user_id, &kind, points, &detail).await?;
        tx.commit().await?;

        Ok(ContentProcessedResponse {
            event_id: recorded.event_id,
            points_awarded: points,
            activity_kind: kind,
            total_points: recorded.total_points,
            level: recorded.level,
            badges_unlocked: recorded.badges_unlocked,
        })
    }

    pub async fn leaderboard(&self, query: LeaderboardQuery) -> Result<LeaderboardResponse> {
        let limit = query.limit.unwrap_or(self.default_limit);
        let current_user_id = query
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let entries = ranking::get_leaderboard(&self.pool, limit, query.window, query.category).await?;
        let current_user = match current_user_id {
            Some(user_id) => ranking::get_user_rank(&self.pool, user_id, query.category).await?,
            None => None,
        };
        let stats = ranking::get_leaderboard_stats(&self.pool).await?;

        let entries = entries
            .into_iter()
            .map(|entry| LeaderboardRow {
                is_current_user: Some(entry.user_id.as_str()) == current_user_id,
                entry,
            })
            .collect();

        Ok(LeaderboardResponse {
            category: query.category,
            window: query.window,
            entries,
            current_user,
            stats,
        })
    }

    /// Manual leaderboard adjustment: ensures the user, then applies whichever
    /// of points, quiz score and streak the request carries.
    pub async fn update_entry(&self, request: UpdateEntryRequest) -> Result<UpdateEntryResponse> {
        let user_id = require_user_id(&request.user_id)?;
        if request.points_earned < 0 {
            warn!(user_id, points = request.points_earned, "rejected negative points");
            return Err(LeaderboardError::validation("points_earned must be non-negative"));
        }
        if let Some(streak) = request.streak {
            ledger::validate_streak(streak)?;
        }

        let mut badges_unlocked = Vec::new();
        let mut tx = self.pool.begin().await?;
        ledger::ensure_user(
            &mut tx,
            user_id,
            non_blank(request.username.as_deref()),
            non_blank(request.email.as_deref()),
        )
        .await?;

        if request.points_earned > 0 {
            let kind = request.activity_kind.clone().unwrap_or(ActivityKind::General);
            let recorded =
                ledger::record_event_in(&mut tx, user_id, &kind, request.points_earned, "manual update")
                    .await?;
            badges_unlocked.extend(recorded.badges_unlocked);
        }

        if let Some(score) = request.quiz_score {
            let quiz = ledger::record_quiz_stats_in(&mut tx, user_id, score, 100.0, self.pass_ratio)
                .await?;
            badges_unlocked.extend(quiz.badges_unlocked);
        }

        if let Some(streak) = request.streak {
            badges_unlocked.extend(ledger::set_streak_in(&mut tx, user_id, streak).await?);
        }
        tx.commit().await?;

        let user = self.rank_entry(user_id, Category::Points).await?;
        Ok(UpdateEntryResponse {
            user,
            badges_unlocked,
        })
    }

    /// Loads the fixed sample roster. Every point goes through the ledger.
    pub async fn populate_sample_data(&self) -> Result<PopulateResponse> {
        let mut events = 0usize;

        for (user_id, username, email, points, streak, quiz_scores) in SAMPLE_USERS {
            let mut tx = self.pool.begin().await?;
            ledger::ensure_user(&mut tx, user_id, Some(username), Some(email)).await?;
            ledger::record_event_in(&mut tx, user_id, &ActivityKind::SampleData, points, "sample data")
                .await?;
            events += 1;
            for score in quiz_scores {
                ledger::record_quiz_stats_in(&mut tx, user_id, *score, 100.0, self.pass_ratio).await?;
            }
            ledger::set_streak_in(&mut tx, user_id, streak).await?;
            tx.commit().await?;
        }

        info!(users = SAMPLE_USERS.len(), events, "sample data populated");
        Ok(PopulateResponse {
            users: SAMPLE_USERS.len(),
            events,
        })
    }

    async fn rank_entry(&self, user_id: &str, category: Category) -> Result<UserRankEntry> {
        ranking::get_user_rank(&self.pool, user_id, category)
            .await?
            .ok_or_else(|| LeaderboardError::NotFound(format!("no stats for user {user_id}")))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
