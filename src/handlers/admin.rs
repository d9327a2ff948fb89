// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;
use sqlx::FromRow;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::QuestionKind,
        result::{OverrideRequest, TestResult},
        test::{CreateTemplateTestRequest, Test, UpdateTestRequest},
    },
    services::{generator, review},
    state::AppState,
    utils::jwt::{Claims, resolve_identity},
};

/// Dashboard counters for the admin landing page.
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let (total_users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let (total_tests,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tests")
        .fetch_one(&state.pool)
        .await?;
    let (total_submissions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM test_results")
        .fetch_one(&state.pool)
        .await?;
    let (average_score,): (Option<f64>,) =
        sqlx::query_as("SELECT AVG(total_score) FROM test_results")
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(json!({
        "total_users": total_users,
        "total_tests": total_tests,
        "total_submissions": total_submissions,
        "average_score": average_score.unwrap_or(0.0)
    })))
}

/// Lists every test, active or not.
pub async fn list_tests(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let tests = sqlx::query_as::<_, Test>(
        r#"
        SELECT id, title, duration_minutes, total_marks, instructions,
               is_active, organization_id, template_config, created_at
        FROM tests
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(tests))
}

/// Creates a template test.
///
/// Section kinds must name known banks; the total is derived from the
/// sections so it can never drift from what generation will produce.
pub async fn create_test(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    for section in &payload.sections {
        if QuestionKind::parse(&section.kind).is_none() {
            return Err(AppError::BadRequest(format!(
                "Unknown question type '{}'",
                section.kind
            )));
        }
        if section.count == 0 {
            return Err(AppError::BadRequest(
                "Section count must be at least 1".to_string(),
            ));
        }
        if section.marks <= 0 {
            return Err(AppError::BadRequest(
                "Section marks must be positive".to_string(),
            ));
        }
    }

    let total_marks = generator::template_total_marks(&payload.sections);

    let test = sqlx::query_as::<_, Test>(
        r#"
        INSERT INTO tests (title, duration_minutes, total_marks, instructions, organization_id, template_config, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        RETURNING id, title, duration_minutes, total_marks, instructions,
                  is_active, organization_id, template_config, created_at
        "#,
    )
    .bind(&payload.title)
    .bind(payload.duration_minutes)
    .bind(total_marks)
    .bind(&payload.instructions)
    .bind(payload.organization_id)
    .bind(sqlx::types::Json(&payload.sections))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!("Created template test '{}' (id {})", test.title, test.id);

    Ok((StatusCode::CREATED, Json(test)))
}

/// Updates test settings. Only the supplied fields change; an
/// organization_id of 0 makes the test public.
pub async fn update_test(
    State(state): State<AppState>,
    Path(test_id): Path<i64>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut test = sqlx::query_as::<_, Test>(
        r#"
        SELECT id, title, duration_minutes, total_marks, instructions,
               is_active, organization_id, template_config, created_at
        FROM tests
        WHERE id = $1
        "#,
    )
    .bind(test_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    if let Some(title) = payload.title {
        test.title = title;
    }
    if let Some(duration) = payload.duration_minutes {
        if duration < 1 {
            return Err(AppError::BadRequest("Duration must be at least 1 minute".to_string()));
        }
        test.duration_minutes = duration;
    }
    if let Some(instructions) = payload.instructions {
        test.instructions = Some(instructions);
    }
    if let Some(is_active) = payload.is_active {
        test.is_active = is_active;
    }
    if let Some(org_id) = payload.organization_id {
        test.organization_id = if org_id == 0 { None } else { Some(org_id) };
    }

    let test = sqlx::query_as::<_, Test>(
        r#"
        UPDATE tests
        SET title = $2, duration_minutes = $3, instructions = $4, is_active = $5, organization_id = $6
        WHERE id = $1
        RETURNING id, title, duration_minutes, total_marks, instructions,
                  is_active, organization_id, template_config, created_at
        "#,
    )
    .bind(test.id)
    .bind(&test.title)
    .bind(test.duration_minutes)
    .bind(&test.instructions)
    .bind(test.is_active)
    .bind(test.organization_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(test))
}

/// Deletes a test along with its sessions, fixed questions and results.
pub async fn delete_test(
    State(state): State<AppState>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = sqlx::query("DELETE FROM tests WHERE id = $1")
        .bind(test_id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    tracing::info!("Deleted test {}", test_id);

    Ok(Json(json!({ "message": "Test deleted" })))
}

/// Joined row for the admin result listing.
#[derive(Debug, Serialize, FromRow)]
pub struct AdminResultRow {
    pub result_id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    pub test_id: i64,
    pub test_title: String,
    pub total_score: f64,
    pub max_marks: i32,
    pub status: String,
    pub flags: i32,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Lists all results across candidates, best score first.
pub async fn list_results(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, AdminResultRow>(
        r#"
        SELECT r.id AS result_id,
               u.id AS user_id,
               u.full_name,
               u.email,
               t.id AS test_id,
               t.title AS test_title,
               r.total_score,
               t.total_marks AS max_marks,
               r.status,
               r.flags,
               r.completed_at
        FROM test_results r
        JOIN users u ON u.id = r.user_id
        JOIN tests t ON t.id = r.test_id
        ORDER BY r.total_score DESC, r.completed_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(results))
}

async fn fetch_result(state: &AppState, result_id: i64) -> Result<TestResult, AppError> {
    sqlx::query_as::<_, TestResult>(
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
    .ok_or_else(|| AppError::NotFound("Result not found".to_string()))
}

/// Full per-question breakdown for one result, with candidate details.
pub async fn result_detail(
    State(state): State<AppState>,
    Path(result_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = fetch_result(&state, result_id).await?;

    let candidate: Option<(String, String)> =
        sqlx::query_as("SELECT full_name, email FROM users WHERE id = $1")
            .bind(result.user_id)
            .fetch_optional(&state.pool)
            .await?;

    let (full_name, email) = candidate.unwrap_or(("Unknown".to_string(), "".to_string()));

    Ok(Json(json!({
        "result_id": result.id,
        "user_id": result.user_id,
        "full_name": full_name,
        "email": email,
        "test_id": result.test_id,
        "total_score": result.total_score,
        "status": result.status,
        "flags": result.flags,
        "breakdown": result.breakdown.0,
        "completed_at": result.completed_at
    })))
}

/// Overrides the score of one question in a result.
///
/// The graded score is preserved in the breakdown for the audit trail; the
/// override carries the reviewer's name, a timestamp and the optional
/// reason, and the stored total is recomputed from the full breakdown.
pub async fn override_score(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(result_id): Path<i64>,
    Json(payload): Json<OverrideRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = resolve_identity(&state.pool, &state.config, &claims).await?;
    let result = fetch_result(&state, result_id).await?;

    let mut items = result.breakdown.0;
    let response = review::apply_override(
        &mut items,
        payload.question_id,
        payload.new_score,
        identity.display_name(),
        payload.reason,
        chrono::Utc::now(),
    )?;

    review::persist_override(&state.pool, result_id, &items, response.new_total).await?;

    tracing::info!(
        "Score override on result {} question {}: {} -> {}",
        result_id,
        response.question_id,
        result.total_score,
        response.new_total
    );

    Ok(Json(response))
}
