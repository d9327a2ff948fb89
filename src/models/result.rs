// src/models/result.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Per-question audit record of how a score was derived.
///
/// Text fields are length-capped at write time (200 chars for the question,
/// 500 for answers). Override fields are only present after a manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub question_id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub question_text: String,
    pub correct_answer: String,
    pub student_answer: String,
    pub max_marks: i32,
    pub student_score: f64,
    /// Strategy-specific detail (rubric sub-scores, match verdicts, error
    /// markers). Stored verbatim for the admin report.
    pub ai_feedback: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
}

impl BreakdownItem {
    /// The score that counts towards the total: the override when one
    /// exists, the originally graded score otherwise.
    pub fn effective_score(&self) -> f64 {
        self.override_score.unwrap_or(self.student_score)
    }
}

/// Represents the 'test_results' table.
///
/// (user_id, test_id) is unique: at most one result per candidate per test.
/// `total_score` always equals the sum of effective breakdown scores; the
/// override path re-derives it on every mutation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub total_score: f64,
    pub breakdown: sqlx::types::Json<Vec<BreakdownItem>>,
    /// 'submitted', 'graded' or 'reviewed'.
    pub status: String,
    /// Tab-switch count reported by the exam client.
    pub flags: i32,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for the finish-exam submission.
#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    /// Stringified question id -> answer text. Missing ids are graded as
    /// empty answers.
    pub answers: HashMap<String, String>,
    #[serde(default)]
    pub flags: i32,
    #[serde(default)]
    pub tab_switches: i32,
    /// Present for template-based tests; absent in legacy mode.
    pub session_id: Option<i64>,
}

impl FinishRequest {
    pub fn tab_switch_count(&self) -> i32 {
        if self.flags != 0 { self.flags } else { self.tab_switches }
    }
}

/// DTO for a manual score override on one breakdown item.
#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub question_id: i64,
    pub new_score: f64,
    pub reason: Option<String>,
}

/// Response of a successful override.
#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    pub question_id: i64,
    pub new_score: f64,
    pub new_total: f64,
    pub max_marks: i32,
}
