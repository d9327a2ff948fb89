// src/services/session.rs

use std::collections::HashMap;

use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::config::SESSION_GRACE_MINUTES;
use crate::error::AppError;
use crate::models::question::{GeneratedQuestion, PublicQuestion, Question};
use crate::models::session::{ExamSession, StartTestResponse};
use crate::models::test::Test;
use crate::services::bank::QuestionBank;
use crate::services::generator::generate_question_set;

/// Looks up an existing result id for (user, test). A present row means the
/// single graded attempt has been used up.
pub async fn find_result_id(
    pool: &PgPool,
    user_id: i64,
    test_id: i64,
) -> Result<Option<i64>, AppError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM test_results WHERE user_id = $1 AND test_id = $2")
            .bind(user_id)
            .bind(test_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(id,)| id))
}

/// Fetches the open (not completed) session for (user, test), if any.
pub async fn find_open_session(
    pool: &PgPool,
    user_id: i64,
    test_id: i64,
) -> Result<Option<ExamSession>, AppError> {
    let session = sqlx::query_as::<_, ExamSession>(
        r#"
        SELECT id, user_id, test_id, generated_questions, answers,
               started_at, expires_at, is_completed
        FROM exam_sessions
        WHERE user_id = $1 AND test_id = $2 AND is_completed = FALSE
        "#,
    )
    .bind(user_id)
    .bind(test_id)
    .fetch_optional(pool)
    .await?;
    Ok(session)
}

/// Fetches a session by id, scoped to its owner.
pub async fn find_session_for_user(
    pool: &PgPool,
    session_id: i64,
    user_id: i64,
) -> Result<Option<ExamSession>, AppError> {
    let session = sqlx::query_as::<_, ExamSession>(
        r#"
        SELECT id, user_id, test_id, generated_questions, answers,
               started_at, expires_at, is_completed
        FROM exam_sessions
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(session)
}

/// Session state machine entry point: no-session -> open -> completed.
///
/// 1. A stored TestResult means the attempt is spent: return
///    `already_completed`, create nothing (idempotent).
/// 2. An open session is re-served unchanged, so refreshing the page
///    yields the byte-identical question set.
/// 3. Otherwise a new randomized set is generated from the template and
///    persisted before the candidate sees it.
///
/// Legacy tests (no template config) serve their fixed question rows
/// directly with no session object. Every returned view is stripped of
/// grading config.
pub async fn start(
    pool: &PgPool,
    bank: &QuestionBank,
    user_id: i64,
    test: &Test,
) -> Result<StartTestResponse, AppError> {
    if let Some(result_id) = find_result_id(pool, user_id, test.id).await? {
        return Ok(StartTestResponse::completed(result_id));
    }

    if let Some(session) = find_open_session(pool, user_id, test.id).await? {
        return Ok(StartTestResponse::open(
            Some(session.id),
            test.title.clone(),
            test.duration_minutes,
            session.public_questions(),
        ));
    }

    if let Some(sections) = test.sections() {
        // Scoped so the thread-local rng is dropped before any await.
        let questions = {
            let mut rng = rand::thread_rng();
            generate_question_set(sections, bank, &mut rng)
        };
        let session = create_session(pool, user_id, test, questions).await?;
        return Ok(StartTestResponse::open(
            Some(session.id),
            test.title.clone(),
            test.duration_minutes,
            session.public_questions(),
        ));
    }

    // Legacy mode: fixed, pre-authored questions straight from the table.
    let questions = fetch_fixed_questions(pool, test.id).await?;
    let public = questions
        .iter()
        .map(|q| PublicQuestion {
            id: q.id,
            question_type: q.question_type.clone(),
            content: q.content.0.clone(),
            marks: q.marks,
        })
        .collect();

    Ok(StartTestResponse::open(
        None,
        test.title.clone(),
        test.duration_minutes,
        public,
    ))
}

/// Persists a freshly generated session. Expiry gets a grace period on top
/// of the test duration so a submission racing the clock still lands.
pub async fn create_session(
    pool: &PgPool,
    user_id: i64,
    test: &Test,
    questions: Vec<GeneratedQuestion>,
) -> Result<ExamSession, AppError> {
    let expires_at =
        Utc::now() + Duration::minutes(test.duration_minutes as i64 + SESSION_GRACE_MINUTES);

    let session = sqlx::query_as::<_, ExamSession>(
        r#"
        INSERT INTO exam_sessions (user_id, test_id, generated_questions, answers, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, test_id, generated_questions, answers,
                  started_at, expires_at, is_completed
        "#,
    )
    .bind(user_id)
    .bind(test.id)
    .bind(sqlx::types::Json(questions))
    .bind(sqlx::types::Json(HashMap::<String, String>::new()))
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(session)
}

/// Loads the fixed question rows of a legacy test, in authored order.
pub async fn fetch_fixed_questions(
    pool: &PgPool,
    test_id: i64,
) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, test_id, question_type, marks, content, grading_config
        FROM questions
        WHERE test_id = $1
        ORDER BY id
        "#,
    )
    .bind(test_id)
    .fetch_all(pool)
    .await?;
    Ok(questions)
}
