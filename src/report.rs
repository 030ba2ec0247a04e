use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{Category, LeaderboardStats, ScoreEvent, UserRankEntry};

#[derive(Debug, Clone)]
pub struct ActivitySummary {
    pub activity_kind: String,
    pub count: usize,
    pub total_points: i64,
}

pub fn summarize_by_kind(events: &[ScoreEvent]) -> Vec<ActivitySummary> {
    let mut map: HashMap<String, (usize, i64)> = HashMap::new();

    for event in events {
        let entry = map
            .entry(event.activity_kind.as_str().to_string())
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += event.points_earned;
    }

    let mut summaries: Vec<ActivitySummary> = map
        .into_iter()
        .map(|(activity_kind, (count, total_points))| ActivitySummary {
            activity_kind,
            count,
            total_points,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.activity_kind.cmp(&b.activity_kind))
    });
    summaries
}

fn rank_delta(entry: &UserRankEntry) -> String {
    match entry.rank_change() {
        Some(change) if change > 0 => format!("▲{change}"),
        Some(change) if change < 0 => format!("▼{}", -change),
        Some(_) => "=".to_string(),
        None => "new".to_string(),
    }
}

pub fn build_report(
    category: Category,
    stats: &LeaderboardStats,
    entries: &[UserRankEntry],
    recent_events: &[ScoreEvent],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Leaderboard Report");
    let _ = writeln!(output, "Ranked by {}", category.as_str());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Learners: {}", stats.total_users);
    let _ = writeln!(output, "- Average points: {:.1}", stats.average_points);
    let _ = writeln!(
        output,
        "- Longest streak: {} ({})",
        stats.max_streak, stats.top_streak_username
    );
    let _ = writeln!(output, "- Most active day: {}", stats.most_active_day);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Standings");

    if entries.is_empty() {
        let _ = writeln!(output, "No learners on the board yet.");
    } else {
        for entry in entries {
            let _ = writeln!(
                output,
                "{}. {} ({}) {} points, level {}, {} quizzes at {:.1}% [{}]",
                entry.rank,
                entry.username,
                entry.user_id,
                entry.stats.points,
                entry.stats.level,
                entry.stats.total_quizzes,
                entry.average_score,
                rank_delta(entry)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Activity Mix");
    let summaries = summarize_by_kind(recent_events);

    if summaries.is_empty() {
        let _ = writeln!(output, "No activity recorded.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} events, {} points",
                summary.activity_kind, summary.count, summary.total_points
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");

    if recent_events.is_empty() {
        let _ = writeln!(output, "No activity recorded.");
    } else {
        for event in recent_events.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} {} +{} on {}: {}",
                event.user_id,
                event.activity_kind,
                event.points_earned,
                event.occurred_at.format("%Y-%m-%d"),
                event.detail
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, AggregateStats};
    use chrono::Utc;

    fn event(kind: ActivityKind, points: i64) -> ScoreEvent {
        ScoreEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            user_id: "user_001".to_string(),
            activity_kind: kind,
            points_earned: points,
            detail: "detail".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn activity_mix_orders_by_points() {
        let events = vec![
            event(ActivityKind::QuizCompleted, 20),
            event(ActivityKind::PdfProcessed, 45),
            event(ActivityKind::QuizCompleted, 15),
        ];
        let summaries = summarize_by_kind(&events);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].activity_kind, "pdf_processed");
        assert_eq!(summaries[1].count, 2);
        assert_eq!(summaries[1].total_points, 35);
    }

    #[test]
    fn report_lists_standings_with_rank_deltas() {
        let stats = LeaderboardStats {
            total_users: 1,
            average_points: 250.0,
            max_streak: 3,
            top_streak_username: "Alex Johnson".to_string(),
            most_active_day: "Monday".to_string(),
        };
        let entry = UserRankEntry {
            user_id: "user_001".to_string(),
            username: "Alex Johnson".to_string(),
            email: None,
            joined_at: Utc::now(),
            rank: 1,
            average_score: 80.0,
            stats: AggregateStats {
                points: 250,
                level: 3,
                total_quizzes: 5,
                previous_rank: Some(3),
                ..AggregateStats::default()
            },
        };

        let report = build_report(
            Category::Points,
            &stats,
            &[entry],
            &[event(ActivityKind::PdfProcessed, 25)],
        );
        assert!(report.contains("Ranked by points"));
        assert!(report.contains("1. Alex Johnson (user_001) 250 points, level 3, 5 quizzes at 80.0% [▲2]"));
        assert!(report.contains("- pdf_processed: 1 events, 25 points"));
    }

    #[test]
    fn empty_board_renders_placeholders() {
        let stats = LeaderboardStats {
            total_users: 0,
            average_points: 0.0,
            max_streak: 0,
            top_streak_username: "N/A".to_string(),
            most_active_day: "N/A".to_string(),
        };
        let report = build_report(Category::Streak, &stats, &[], &[]);
        assert!(report.contains("No learners on the board yet."));
        assert!(report.contains("No activity recorded."));
    }
}
