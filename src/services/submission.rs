// src/services/submission.rs

use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::question::GeneratedQuestion;
use crate::models::result::BreakdownItem;
use crate::services::grading::GradingDispatcher;

/// Sentinel stored in the breakdown when a candidate left a question blank.
pub const NO_ANSWER: &str = "No answer provided";

const QUESTION_TEXT_CAP: usize = 200;
const ANSWER_TEXT_CAP: usize = 500;

/// Outcome of grading a whole submission before it is persisted.
#[derive(Debug)]
pub struct GradedSubmission {
    pub total_score: f64,
    pub max_score: i32,
    pub breakdown: Vec<BreakdownItem>,
}

/// Grades every question of a submission in original question order.
///
/// Answers are looked up by stringified question id; a missing key is an
/// empty answer, never an error. Individual grading faults have already
/// been degraded to zero-score outcomes by the dispatcher, so the loop
/// always completes and the candidate always gets a result.
pub async fn grade_all(
    dispatcher: &GradingDispatcher,
    questions: &[GeneratedQuestion],
    answers: &HashMap<String, String>,
) -> GradedSubmission {
    let mut total_score = 0.0;
    let mut max_score = 0;
    let mut breakdown = Vec::with_capacity(questions.len());

    for question in questions {
        max_score += question.marks;

        let student_text = answers
            .get(&question.temp_id.to_string())
            .map(String::as_str)
            .unwrap_or("");

        let outcome = dispatcher.grade(question, student_text).await;
        total_score += outcome.score;

        let student_answer = if student_text.is_empty() {
            NO_ANSWER.to_string()
        } else {
            truncate_chars(student_text, ANSWER_TEXT_CAP)
        };

        breakdown.push(BreakdownItem {
            question_id: question.temp_id,
            question_type: question.question_type.clone(),
            question_text: truncate_with_ellipsis(&question.display_text(), QUESTION_TEXT_CAP),
            correct_answer: truncate_chars(
                question.grading_config.display_answer(),
                ANSWER_TEXT_CAP,
            ),
            student_answer,
            max_marks: question.marks,
            student_score: outcome.score,
            ai_feedback: outcome.breakdown,
            override_score: None,
            override_by: None,
            override_at: None,
            override_reason: None,
        });
    }

    GradedSubmission { total_score, max_score, breakdown }
}

/// Marks the session completed and snapshots the raw answers onto it.
pub async fn complete_session(
    pool: &PgPool,
    session_id: i64,
    answers: &HashMap<String, String>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE exam_sessions SET is_completed = TRUE, answers = $2 WHERE id = $1")
        .bind(session_id)
        .bind(sqlx::types::Json(answers))
        .execute(pool)
        .await?;
    Ok(())
}

/// Persists the final result, exactly once per (user, test).
///
/// The natural-key upsert is what enforces the single-result invariant
/// under retried or racing finish calls: the second writer overwrites the
/// first instead of inserting a duplicate row.
pub async fn upsert_result(
    pool: &PgPool,
    user_id: i64,
    test_id: i64,
    graded: &GradedSubmission,
    flags: i32,
) -> Result<i64, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO test_results (user_id, test_id, total_score, breakdown, status, flags)
        VALUES ($1, $2, $3, $4, 'graded', $5)
        ON CONFLICT (user_id, test_id) DO UPDATE SET
            total_score = EXCLUDED.total_score,
            breakdown = EXCLUDED.breakdown,
            status = EXCLUDED.status,
            flags = EXCLUDED.flags,
            completed_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(test_id)
    .bind(graded.total_score)
    .bind(sqlx::types::Json(&graded.breakdown))
    .bind(flags)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Caps a string at `max` characters, appending an ellipsis when cut.
fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let mut cut: String = s.chars().take(max).collect();
        cut.push_str("...");
        cut
    } else {
        s.to_string()
    }
}

/// Caps a string at `max` characters, no ellipsis.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::GradingConfig;
    use crate::services::ai::{JudgeModel, ModelError, SimilarityModel};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct FixedJudge(Value);

    #[async_trait]
    impl JudgeModel for FixedJudge {
        async fn judge(&self, _prompt: &str) -> Value {
            self.0.clone()
        }
    }

    struct FixedScorer(f32);

    #[async_trait]
    impl SimilarityModel for FixedScorer {
        async fn similarity(&self, _a: &str, _b: &str) -> Result<f32, ModelError> {
            Ok(self.0)
        }

        async fn key_idea_coverage(
            &self,
            _text: &str,
            _ideas: &[String],
        ) -> Result<f32, ModelError> {
            Ok(1.0)
        }
    }

    fn dispatcher(judge_total: f64) -> GradingDispatcher {
        GradingDispatcher::new(
            Arc::new(FixedScorer(0.1)),
            Arc::new(FixedJudge(json!({ "total_score": judge_total, "passed": true }))),
        )
    }

    fn jumble(temp_id: i64, correct: &str, marks: i32) -> GeneratedQuestion {
        GeneratedQuestion {
            temp_id,
            question_type: "jumble".to_string(),
            content: json!({ "sentence": "city capital the France of" }),
            grading_config: GradingConfig::Key { correct_answer: correct.to_string() },
            marks,
        }
    }

    fn video(temp_id: i64, marks: i32) -> GeneratedQuestion {
        GeneratedQuestion {
            temp_id,
            question_type: "video".to_string(),
            content: json!({ "title": "Describe the clip", "url": "/static/videos/v1.mp4" }),
            grading_config: GradingConfig::Rubric {
                reference: "A man walks to the door.".to_string(),
                key_ideas: vec![],
            },
            marks,
        }
    }

    #[tokio::test]
    async fn totals_and_order_follow_the_question_list() {
        let d = dispatcher(12.0);
        let questions = vec![jumble(1, "Paris", 5), video(2, 15), jumble(3, "Rome", 5)];

        let mut answers = HashMap::new();
        answers.insert("1".to_string(), "paris".to_string());
        answers.insert("2".to_string(), "He walks to the door.".to_string());
        answers.insert("3".to_string(), "Madrid".to_string());

        let graded = grade_all(&d, &questions, &answers).await;

        assert_eq!(graded.max_score, 25);
        assert_eq!(graded.total_score, 5.0 + 12.0 + 0.0);
        let ids: Vec<i64> = graded.breakdown.iter().map(|b| b.question_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_answer_grades_as_empty_with_sentinel() {
        let d = dispatcher(12.0);
        let questions = vec![video(1, 15)];
        let answers = HashMap::new();

        let graded = grade_all(&d, &questions, &answers).await;

        assert_eq!(graded.total_score, 0.0);
        assert_eq!(graded.breakdown[0].student_answer, NO_ANSWER);
        assert_eq!(graded.breakdown[0].ai_feedback["error"], "No answer provided");
    }

    #[tokio::test]
    async fn long_texts_are_capped() {
        let d = dispatcher(3.0);
        let mut q = jumble(1, &"x".repeat(900), 5);
        q.content = json!({ "sentence": "s".repeat(400) });

        let mut answers = HashMap::new();
        answers.insert("1".to_string(), "y".repeat(800));

        let graded = grade_all(&d, &[q], &answers).await;
        let item = &graded.breakdown[0];

        assert_eq!(item.question_text.chars().count(), 203); // 200 + "..."
        assert!(item.question_text.ends_with("..."));
        assert_eq!(item.correct_answer.chars().count(), 500);
        assert_eq!(item.student_answer.chars().count(), 500);
    }

    #[test]
    fn truncate_noop_below_cap() {
        assert_eq!(truncate_with_ellipsis("short", 200), "short");
        assert_eq!(truncate_chars("short", 500), "short");
    }
}
