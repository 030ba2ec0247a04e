use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// What earned a user points. Kinds outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityKind {
    QuizCompleted,
    PerfectQuiz,
    PdfProcessed,
    TextProcessed,
    UrlProcessed,
    SampleData,
    General,
    Other(String),
}

impl ActivityKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityKind::QuizCompleted => "quiz_completed",
            ActivityKind::PerfectQuiz => "perfect_quiz",
            ActivityKind::PdfProcessed => "pdf_processed",
            ActivityKind::TextProcessed => "text_processed",
            ActivityKind::UrlProcessed => "url_processed",
            ActivityKind::SampleData => "sample_data",
            ActivityKind::General => "general",
            ActivityKind::Other(kind) => kind,
        }
    }

    pub const CONTENT_KINDS: [&'static str; 3] = ["pdf_processed", "text_processed", "url_processed"];
}

impl From<&str> for ActivityKind {
    fn from(value: &str) -> Self {
        match value.trim() {
            "quiz_completed" => ActivityKind::QuizCompleted,
            "perfect_quiz" => ActivityKind::PerfectQuiz,
            "pdf_processed" => ActivityKind::PdfProcessed,
            "text_processed" => ActivityKind::TextProcessed,
            "url_processed" => ActivityKind::UrlProcessed,
            "sample_data" => ActivityKind::SampleData,
            "general" | "" => ActivityKind::General,
            other => ActivityKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ActivityKind {
    fn from(value: String) -> Self {
        ActivityKind::from(value.as_str())
    }
}

impl From<ActivityKind> for String {
    fn from(kind: ActivityKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Url,
    Text,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Url => "url",
            ContentType::Text => "text",
        }
    }

    pub fn activity_kind(self) -> ActivityKind {
        match self {
            ContentType::Pdf => ActivityKind::PdfProcessed,
            ContentType::Url => ActivityKind::UrlProcessed,
            ContentType::Text => ActivityKind::TextProcessed,
        }
    }
}

/// Leaderboard sort category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Points,
    Weekly,
    Monthly,
    Quizzes,
    Streak,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Points,
        Category::Weekly,
        Category::Monthly,
        Category::Quizzes,
        Category::Streak,
    ];

    /// Column of `leaderboard_stats` this category orders by.
    pub fn sort_column(self) -> &'static str {
        match self {
            Category::Points => "points",
            Category::Weekly => "weekly_points",
            Category::Monthly => "monthly_points",
            Category::Quizzes => "total_quizzes",
            Category::Streak => "streak",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Points => "points",
            Category::Weekly => "weekly",
            Category::Monthly => "monthly",
            Category::Quizzes => "quizzes",
            Category::Streak => "streak",
        }
    }
}

/// Accepted on leaderboard queries; rows are not filtered by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    All,
    Weekly,
    Monthly,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::All => "all",
            TimeWindow::Weekly => "weekly",
            TimeWindow::Monthly => "monthly",
        }
    }
}

/// Windowed point counter that can be reset by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PointWindow {
    Weekly,
    Monthly,
}

impl PointWindow {
    pub fn column(self) -> &'static str {
        match self {
            PointWindow::Weekly => "weekly_points",
            PointWindow::Monthly => "monthly_points",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreEvent {
    pub event_id: String,
    pub user_id: String,
    pub activity_kind: ActivityKind,
    pub points_earned: i64,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub points: i64,
    pub level: i64,
    pub streak: i64,
    pub total_quizzes: i64,
    pub correct_answers: i64,
    pub weekly_points: i64,
    pub monthly_points: i64,
    pub previous_rank: Option<i64>,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRankEntry {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub rank: i64,
    pub average_score: f64,
    #[serde(flatten)]
    pub stats: AggregateStats,
}

impl UserRankEntry {
    /// Places gained since the last snapshot; positive means the user moved up.
    pub fn rank_change(&self) -> Option<i64> {
        self.stats.previous_rank.map(|previous| previous - self.rank)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardStats {
    pub total_users: i64,
    pub average_points: f64,
    pub max_streak: i64,
    pub top_streak_username: String,
    pub most_active_day: String,
}

pub fn average_score(correct_answers: i64, total_quizzes: i64) -> f64 {
    if total_quizzes <= 0 {
        return 0.0;
    }
    round_one_decimal(correct_answers as f64 * 100.0 / total_quizzes as f64)
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_score_handles_zero_quizzes() {
        assert_eq!(average_score(0, 0), 0.0);
        assert_eq!(average_score(2, 3), 66.7);
        assert_eq!(average_score(5, 5), 100.0);
    }

    #[test]
    fn unknown_activity_kinds_round_trip_verbatim() {
        let kind = ActivityKind::from("peer_review");
        assert_eq!(kind, ActivityKind::Other("peer_review".to_string()));
        assert_eq!(kind.as_str(), "peer_review");
        assert_eq!(ActivityKind::from("perfect_quiz"), ActivityKind::PerfectQuiz);
        assert_eq!(String::from(ActivityKind::SampleData), "sample_data");
    }

    #[test]
    fn rank_change_is_positive_when_climbing() {
        let entry = UserRankEntry {
            user_id: "user_001".to_string(),
            username: "Alex".to_string(),
            email: None,
            joined_at: Utc::now(),
            rank: 2,
            average_score: 0.0,
            stats: AggregateStats {
                previous_rank: Some(5),
                ..AggregateStats::default()
            },
        };
        assert_eq!(entry.rank_change(), Some(3));
    }
}
