use crate::models::{ActivityKind, ContentType};

/// Points and label awarded for one activity outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizAward {
    pub points: i64,
    pub kind: ActivityKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsPolicy {
    /// `(minimum fraction, points)`, highest tier first. The first tier is a perfect score.
    pub quiz_fraction_tiers: Vec<(f64, i64)>,
    pub quiz_fraction_floor: i64,
    /// `(minimum percent, points)`, highest tier first.
    pub quiz_percent_tiers: Vec<(f64, i64)>,
    pub quiz_percent_floor: i64,
    pub first_quiz_bonus: i64,
    pub pdf_base: i64,
    pub url_base: i64,
    pub text_base: i64,
    /// `(length strictly above, bonus)`, applied cumulatively.
    pub length_bonuses: Vec<(usize, i64)>,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            quiz_fraction_tiers: vec![(1.0, 25), (0.8, 20), (0.6, 15)],
            quiz_fraction_floor: 10,
            quiz_percent_tiers: vec![(90.0, 50), (80.0, 35), (70.0, 25), (60.0, 15)],
            quiz_percent_floor: 5,
            first_quiz_bonus: 50,
            pdf_base: 25,
            url_base: 20,
            text_base: 15,
            length_bonuses: vec![(1000, 10), (5000, 10)],
        }
    }
}

impl PointsPolicy {
    /// Tiered award for a quiz score given as a fraction in `0.0..=1.0`.
    /// Values outside the range land in the nearest tier.
    pub fn score_for_quiz(&self, score_fraction: f64) -> QuizAward {
        let perfect = self
            .quiz_fraction_tiers
            .first()
            .map(|(threshold, _)| *threshold)
            .unwrap_or(1.0);

        let points = tier_points(&self.quiz_fraction_tiers, self.quiz_fraction_floor, score_fraction);
        let kind = if score_fraction >= perfect {
            ActivityKind::PerfectQuiz
        } else {
            ActivityKind::QuizCompleted
        };

        QuizAward { points, kind }
    }

    /// Tiered award for a quiz score given as a percentage in `0..=100`.
    /// 100% and above is a perfect quiz.
    pub fn score_for_quiz_percent(&self, score_percent: f64) -> QuizAward {
        let points = tier_points(&self.quiz_percent_tiers, self.quiz_percent_floor, score_percent);
        let kind = if score_percent >= 100.0 {
            ActivityKind::PerfectQuiz
        } else {
            ActivityKind::QuizCompleted
        };

        QuizAward { points, kind }
    }

    pub fn score_for_content(&self, content_type: ContentType, content_length: usize) -> i64 {
        let base = match content_type {
            ContentType::Pdf => self.pdf_base,
            ContentType::Url => self.url_base,
            ContentType::Text => self.text_base,
        };

        let bonus: i64 = self
            .length_bonuses
            .iter()
            .filter(|(above, _)| content_length > *above)
            .map(|(_, bonus)| bonus)
            .sum();

        base + bonus
    }

    /// Adds the first-quiz bonus when the user has no quiz events yet.
    /// Returns the adjusted points and whether the bonus applied.
    pub fn apply_first_quiz_bonus(
        &self,
        points: i64,
        detail: &mut String,
        prior_quiz_events: i64,
    ) -> (i64, bool) {
        if prior_quiz_events > 0 {
            return (points, false);
        }
        detail.push_str(" (First Quiz Bonus!)");
        (points + self.first_quiz_bonus, true)
    }
}

// NaN never satisfies `>=`, so it falls to the floor.
fn tier_points(tiers: &[(f64, i64)], floor: i64, score: f64) -> i64 {
    tiers
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(floor)
}

pub fn quiz_detail(score_percent: f64) -> String {
    format!("Quiz completed with {}% score", score_percent.clamp(0.0, 100.0) as i64)
}

pub fn content_detail(content_type: ContentType, content_length: usize) -> String {
    format!(
        "Processed {} content ({} chars)",
        content_type.as_str(),
        content_length
    )
}

/// Pass bar for `correct_answers`, kept apart from the point tiers.
pub fn is_pass(score_percent: f64, max_score: f64, pass_ratio: f64) -> bool {
    score_percent >= max_score * pass_ratio
}
