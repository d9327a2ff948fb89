// src/models/session.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::{GeneratedQuestion, PublicQuestion};

/// Represents the 'exam_sessions' table.
///
/// One *open* (is_completed = false) session may exist per (user, test) at a
/// time. The randomized question set is generated once at creation and then
/// only ever re-served, so a page refresh cannot change a candidate's paper.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub generated_questions: sqlx::types::Json<Vec<GeneratedQuestion>>,
    /// Raw answer snapshot, keyed by stringified temp_id. Filled at submit.
    pub answers: sqlx::types::Json<HashMap<String, String>>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_completed: bool,
}

impl ExamSession {
    pub fn questions(&self) -> &[GeneratedQuestion] {
        &self.generated_questions.0
    }

    /// Candidate-safe projection: identical ordering, grading config gone.
    pub fn public_questions(&self) -> Vec<PublicQuestion> {
        self.questions().iter().map(PublicQuestion::from).collect()
    }
}

/// Response of the start-test endpoint.
///
/// `already_completed` short-circuits the rest of the payload: a completed
/// (user, test) pair can never re-open.
#[derive(Debug, Serialize)]
pub struct StartTestResponse {
    pub already_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<PublicQuestion>>,
}

impl StartTestResponse {
    pub fn completed(result_id: i64) -> Self {
        StartTestResponse {
            already_completed: true,
            result_id: Some(result_id),
            session_id: None,
            title: None,
            duration: None,
            questions: None,
        }
    }

    pub fn open(
        session_id: Option<i64>,
        title: String,
        duration: i32,
        questions: Vec<PublicQuestion>,
    ) -> Self {
        StartTestResponse {
            already_completed: false,
            result_id: None,
            session_id,
            title: Some(title),
            duration: Some(duration),
            questions: Some(questions),
        }
    }
}
