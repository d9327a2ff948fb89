// src/services/review.rs

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::result::{BreakdownItem, OverrideResponse};

/// Applies a manual score override to one breakdown item and returns the
/// recomputed total.
///
/// The total is re-derived by scanning the *entire* breakdown (override
/// score where present, graded score otherwise), never by delta-adjusting,
/// so it stays correct when earlier overrides exist or when the same
/// question is overridden twice.
pub fn apply_override(
    items: &mut [BreakdownItem],
    question_id: i64,
    new_score: f64,
    reviewer: &str,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<OverrideResponse, AppError> {
    if new_score < 0.0 {
        return Err(AppError::BadRequest("Override score cannot be negative".to_string()));
    }

    let item = items
        .iter_mut()
        .find(|i| i.question_id == question_id)
        .ok_or_else(|| {
            AppError::NotFound(format!("Question {} not found in breakdown", question_id))
        })?;

    if new_score > item.max_marks as f64 {
        return Err(AppError::BadRequest(format!(
            "Override score {} exceeds the question's maximum of {}",
            new_score, item.max_marks
        )));
    }

    item.override_score = Some(new_score);
    item.override_by = Some(reviewer.to_string());
    item.override_at = Some(now);
    item.override_reason = reason;

    let max_marks = item.max_marks;
    let new_total = recompute_total(items);

    Ok(OverrideResponse { question_id, new_score, new_total, max_marks })
}

/// Sum of effective scores over the whole breakdown.
pub fn recompute_total(items: &[BreakdownItem]) -> f64 {
    items.iter().map(BreakdownItem::effective_score).sum()
}

/// Persists an overridden result.
///
/// The whole breakdown document is rewritten in one statement along with
/// the new total; nested in-place JSON mutation is never relied upon.
pub async fn persist_override(
    pool: &PgPool,
    result_id: i64,
    items: &[BreakdownItem],
    new_total: f64,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE test_results SET breakdown = $2, total_score = $3, status = 'reviewed' WHERE id = $1",
    )
    .bind(result_id)
    .bind(sqlx::types::Json(items))
    .bind(new_total)
    .execute(pool)
    .await?;
    Ok(())
}
