// src/handlers/exam.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};

use crate::{
    error::AppError,
    models::{
        question::GeneratedQuestion,
        result::{FinishRequest, TestResult},
        test::{AvailableTest, Test},
        user::Identity,
    },
    services::{session, submission},
    state::AppState,
    utils::jwt::{Claims, resolve_identity},
};

async fn fetch_test(pool: &PgPool, test_id: i64) -> Result<Test, AppError> {
    sqlx::query_as::<_, Test>(
        r#"
        SELECT id, title, duration_minutes, total_marks, instructions,
               is_active, organization_id, template_config, created_at
        FROM tests
        WHERE id = $1
        "#,
    )
    .bind(test_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Test not found".to_string()))
}

/// Access preconditions shared by start and finish: the test must be
/// active, and a tenant-scoped test only admits candidates of that tenant.
/// Public tests (no organization) admit anyone.
fn check_access(test: &Test, identity: &Identity) -> Result<(), AppError> {
    if !test.is_active {
        return Err(AppError::Forbidden("This test is no longer available".to_string()));
    }

    if let Some(org_id) = test.organization_id {
        if identity.organization_id() != Some(org_id) {
            return Err(AppError::Forbidden(
                "You are not authorized to access this test".to_string(),
            ));
        }
    }

    Ok(())
}

/// Lists active tests visible to the caller's organization (plus public
/// ones), with completion status.
pub async fn available_tests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let identity = resolve_identity(&state.pool, &state.config, &claims).await?;

    let tests = match identity.organization_id() {
        Some(org_id) => {
            sqlx::query_as::<_, Test>(
                r#"
                SELECT id, title, duration_minutes, total_marks, instructions,
                       is_active, organization_id, template_config, created_at
                FROM tests
                WHERE is_active = TRUE AND (organization_id = $1 OR organization_id IS NULL)
                ORDER BY created_at DESC
                "#,
            )
            .bind(org_id)
            .fetch_all(&state.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Test>(
                r#"
                SELECT id, title, duration_minutes, total_marks, instructions,
                       is_active, organization_id, template_config, created_at
                FROM tests
                WHERE is_active = TRUE AND organization_id IS NULL
                ORDER BY created_at DESC
                "#,
            )
            .fetch_all(&state.pool)
            .await?
        }
    };

    let completed: Vec<(i64, i64)> =
        sqlx::query_as("SELECT test_id, id FROM test_results WHERE user_id = $1")
            .bind(identity.user_id())
            .fetch_all(&state.pool)
            .await?;
    let completed: HashMap<i64, i64> = completed.into_iter().collect();

    let fixed_counts: Vec<(i64, i64)> =
        sqlx::query_as("SELECT test_id, COUNT(*) FROM questions GROUP BY test_id")
            .fetch_all(&state.pool)
            .await?;
    let fixed_counts: HashMap<i64, i64> = fixed_counts.into_iter().collect();

    let listing: Vec<AvailableTest> = tests
        .iter()
        .map(|t| {
            let question_count = match t.sections() {
                Some(sections) => sections.iter().map(|s| s.count as i64).sum(),
                None => fixed_counts.get(&t.id).copied().unwrap_or(0),
            };
            AvailableTest {
                id: t.id,
                title: t.title.clone(),
                duration: t.duration_minutes,
                total_marks: t.total_marks,
                question_count,
                completed: completed.contains_key(&t.id),
                result_id: completed.get(&t.id).copied(),
            }
        })
        .collect();

    Ok(Json(listing))
}

/// Joined row for the caller's result history.
#[derive(Debug, Serialize, FromRow)]
pub struct MyResultRow {
    pub result_id: i64,
    pub test_id: i64,
    pub test_title: String,
    pub test_active: bool,
    pub total_score: f64,
    pub max_marks: i32,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Lists the caller's results, including those of tests that have since
/// gone inactive. Candidates keep the right to see what they scored.
pub async fn my_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, MyResultRow>(
        r#"
        SELECT r.id AS result_id,
               r.test_id,
               t.title AS test_title,
               t.is_active AS test_active,
               r.total_score,
               t.total_marks AS max_marks,
               r.completed_at
        FROM test_results r
        JOIN tests t ON t.id = r.test_id
        WHERE r.user_id = $1
        ORDER BY r.completed_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(results))
}

/// Starts (or resumes) an exam.
///
/// Delegates the session state machine to the session service; this layer
/// only does the access checks and never leaks grading config.
pub async fn start_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let identity = resolve_identity(&state.pool, &state.config, &claims).await?;
    let test = fetch_test(&state.pool, test_id).await?;
    check_access(&test, &identity)?;

    let response = session::start(&state.pool, &state.banks, identity.user_id(), &test).await?;
    Ok(Json(response))
}

/// Finishes an exam: grades every answer, completes the session and
/// persists the result exactly once per (user, test).
pub async fn finish_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(submission_req): Json<FinishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = resolve_identity(&state.pool, &state.config, &claims).await?;
    let test = fetch_test(&state.pool, test_id).await?;
    check_access(&test, &identity)?;

    let user_id = identity.user_id();

    // All preconditions are checked before any grading spend.
    let (questions, session_id): (Vec<GeneratedQuestion>, Option<i64>) =
        match submission_req.session_id {
            Some(session_id) => {
                let session = session::find_session_for_user(&state.pool, session_id, user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Exam session not found".to_string()))?;

                // A session only finishes the test it was opened for.
                if session.test_id != test_id {
                    return Err(AppError::NotFound("Exam session not found".to_string()));
                }

                if session.is_completed {
                    return Err(AppError::BadRequest(
                        "This exam has already been submitted".to_string(),
                    ));
                }

                (session.generated_questions.0.clone(), Some(session.id))
            }
            None => {
                let fixed = session::fetch_fixed_questions(&state.pool, test_id).await?;
                (fixed.iter().map(|q| q.to_generated()).collect(), None)
            }
        };

    let graded =
        submission::grade_all(&state.dispatcher, &questions, &submission_req.answers).await;

    if let Some(session_id) = session_id {
        submission::complete_session(&state.pool, session_id, &submission_req.answers).await?;
    }

    let result_id = submission::upsert_result(
        &state.pool,
        user_id,
        test_id,
        &graded,
        submission_req.tab_switch_count(),
    )
    .await?;

    tracing::info!(
        "Graded submission for user {} on test {}: {}/{}",
        user_id,
        test_id,
        graded.total_score,
        graded.max_score
    );

    Ok(Json(json!({ "result_id": result_id })))
}

/// Returns a result's total and audit breakdown. Candidates may only read
/// their own results; admins may read any.
pub async fn result_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(result_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let identity = resolve_identity(&state.pool, &state.config, &claims).await?;

    let result = sqlx::query_as::<_, TestResult>(
        r#"
        SELECT id, user_id, test_id, total_score, breakdown, status, flags,
               submitted_at, completed_at
        FROM test_results
        WHERE id = $1
        "#,
    )
    .bind(result_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Result not found".to_string()))?;

    if result.user_id != identity.user_id() && !identity.is_admin() {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    Ok(Json(json!({
        "total_score": result.total_score,
        "status": result.status,
        "breakdown": result.breakdown.0,
        "date": result.submitted_at
    })))
}
