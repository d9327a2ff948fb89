// src/services/grading.rs

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::PLAGIARISM_THRESHOLD;
use crate::models::question::{GeneratedQuestion, GradingConfig, QuestionKind};
use crate::services::ai::{
    JudgeModel, SimilarityModel, image_prompt, reading_prompt, video_prompt,
};

/// Result of grading one question: a score within [0, max_marks] plus the
/// strategy-specific detail kept for the audit breakdown.
#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub score: f64,
    pub breakdown: Value,
}

impl GradeOutcome {
    fn zero(breakdown: Value) -> Self {
        GradeOutcome { score: 0.0, breakdown }
    }
}

/// Routes one (question, answer) pair to the strategy matching the
/// question's type and normalizes the result.
///
/// Grading never fails: model faults, unknown types and malformed configs
/// all degrade to zero-score outcomes with an explanatory breakdown, so one
/// question can never abort the rest of a submission.
pub struct GradingDispatcher {
    scorer: Arc<dyn SimilarityModel>,
    judge: Arc<dyn JudgeModel>,
}

impl GradingDispatcher {
    pub fn new(scorer: Arc<dyn SimilarityModel>, judge: Arc<dyn JudgeModel>) -> Self {
        GradingDispatcher { scorer, judge }
    }

    pub async fn grade(&self, question: &GeneratedQuestion, answer: &str) -> GradeOutcome {
        match QuestionKind::parse(&question.question_type) {
            Some(QuestionKind::Video) => {
                self.grade_described(question, answer, Described::Video).await
            }
            Some(QuestionKind::Image) => {
                self.grade_described(question, answer, Described::Image).await
            }
            Some(QuestionKind::Reading) => self.grade_reading(question, answer).await,
            Some(QuestionKind::Jumble) => {
                grade_jumble(answer, question.grading_config.correct_answer(), question.marks)
            }
            Some(kind) if kind.is_mcq() => {
                grade_mcq(answer, question.grading_config.correct_answer(), question.marks)
            }
            // Bank types newer than this binary: mcq-* still grades
            // deterministically, everything else goes to manual review.
            None if question.question_type.starts_with("mcq") => {
                grade_mcq(answer, question.grading_config.correct_answer(), question.marks)
            }
            _ => GradeOutcome::zero(json!({ "error": "Manual review needed" })),
        }
    }

    /// Video and image answers share the 15-point description rubric.
    async fn grade_described(
        &self,
        question: &GeneratedQuestion,
        answer: &str,
        kind: Described,
    ) -> GradeOutcome {
        if answer.trim().is_empty() {
            return GradeOutcome::zero(json!({
                "error": "No answer provided",
                "grammar_structure_score": 0,
                "vocabulary_word_choice_score": 0,
                "clarity_meaning_score": 0,
                "instruction_compliance_score": 0,
                "spelling_formatting_score": 0,
                "feedback": "No answer was provided."
            }));
        }

        let context = question
            .content
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(kind.default_context());
        let reference = question.grading_config.reference();

        let prompt = match kind {
            Described::Video => video_prompt(answer, reference, context),
            Described::Image => image_prompt(answer, reference, context),
        };
        let verdict = self.judge.judge(&prompt).await;

        // The judge's reported total is authoritative; sub-scores are
        // surfaced for display, not re-summed here.
        let score = judge_total(&verdict, question.marks);

        GradeOutcome {
            score,
            breakdown: json!({
                "grammar_structure_score": verdict.get("grammar_structure_score").cloned().unwrap_or(json!(0)),
                "vocabulary_word_choice_score": verdict.get("vocabulary_word_choice_score").cloned().unwrap_or(json!(0)),
                "clarity_meaning_score": verdict.get("clarity_meaning_score").cloned().unwrap_or(json!(0)),
                "instruction_compliance_score": verdict.get("instruction_compliance_score").cloned().unwrap_or(json!(0)),
                "spelling_formatting_score": verdict.get("spelling_formatting_score").cloned().unwrap_or(json!(0)),
                "passed": verdict.get("passed").cloned().unwrap_or(json!(false)),
                "feedback": verdict.get("feedback").cloned().unwrap_or(json!("")),
                "grade_justification": verdict.get("grade_justification").cloned().unwrap_or(json!("")),
            }),
        }
    }

    async fn grade_reading(&self, question: &GeneratedQuestion, answer: &str) -> GradeOutcome {
        if answer.trim().is_empty() {
            return GradeOutcome::zero(json!({
                "error": "No answer provided",
                "key_idea_coverage_score": 0,
                "paraphrasing_score": 0,
                "grammar_structure_score": 0,
                "coherence_flow_score": 0,
                "vocabulary_precision_score": 0,
                "feedback": "No answer was provided."
            }));
        }

        let passage = question
            .content
            .get("passage")
            .and_then(|p| p.as_str())
            .unwrap_or_default();

        // Plagiarism gate before any judge spend: verbatim reproduction is
        // never creditable, whatever the rubric would say.
        let similarity = match self.scorer.similarity(answer, passage).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Similarity check failed: {}", e);
                return GradeOutcome::zero(json!({
                    "error": "Similarity check failed",
                    "feedback": format!("Evaluation Error: {}", e.0)
                }));
            }
        };

        if similarity > PLAGIARISM_THRESHOLD {
            return GradeOutcome::zero(json!({
                "error": "Plagiarism Detected (Too similar to passage)",
                "similarity_to_passage": format!("{}%", (similarity * 100.0).round() as i32),
                "feedback": "Your summary appears to be copied directly from the passage. Write in your own words."
            }));
        }

        let reference = question.grading_config.reference();
        let key_ideas = question.grading_config.key_ideas();
        let verdict = self
            .judge
            .judge(&reading_prompt(answer, passage, reference, key_ideas))
            .await;
        let score = judge_total(&verdict, question.marks);

        GradeOutcome {
            score,
            breakdown: json!({
                "key_idea_coverage_score": verdict.get("key_idea_coverage_score").cloned().unwrap_or(json!(0)),
                "paraphrasing_score": verdict.get("paraphrasing_score").cloned().unwrap_or(json!(0)),
                "grammar_structure_score": verdict.get("grammar_structure_score").cloned().unwrap_or(json!(0)),
                "coherence_flow_score": verdict.get("coherence_flow_score").cloned().unwrap_or(json!(0)),
                "vocabulary_precision_score": verdict.get("vocabulary_precision_score").cloned().unwrap_or(json!(0)),
                "passed": verdict.get("passed").cloned().unwrap_or(json!(false)),
                "key_ideas_found": verdict.get("key_ideas_found").cloned().unwrap_or(json!([])),
                "key_ideas_missing": verdict.get("key_ideas_missing").cloned().unwrap_or(json!([])),
                "feedback": verdict.get("feedback").cloned().unwrap_or(json!("")),
                "grade_justification": verdict.get("grade_justification").cloned().unwrap_or(json!("")),
            }),
        }
    }
}

enum Described {
    Video,
    Image,
}

impl Described {
    fn default_context(&self) -> &'static str {
        match self {
            Described::Video => "Video description task",
            Described::Image => "Image description task",
        }
    }
}

/// Extracts the judge's self-reported total and clamps it into the valid
/// range. A missing total (the safe default after a failed call) reads as 0.
fn judge_total(verdict: &Value, max_marks: i32) -> f64 {
    verdict
        .get("total_score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, max_marks as f64)
}

/// Jumble sentences are deterministic: normalized exact match, full marks
/// or zero, no partial credit.
pub fn grade_jumble(answer: &str, correct: &str, marks: i32) -> GradeOutcome {
    if answer.trim().is_empty() {
        return GradeOutcome::zero(json!({
            "result": "Incorrect",
            "correct_answer": correct
        }));
    }

    let is_correct = answer.trim().to_lowercase() == correct.trim().to_lowercase();

    GradeOutcome {
        score: if is_correct { marks as f64 } else { 0.0 },
        breakdown: json!({
            "result": if is_correct { "Correct" } else { "Incorrect" },
            "student_answer": answer
        }),
    }
}

/// MCQ answers are either a plain option key or, for multi-blank questions,
/// a JSON object of blank -> choice. When both sides parse as objects they
/// are compared structurally; otherwise case-insensitive string equality.
pub fn grade_mcq(answer: &str, correct: &str, marks: i32) -> GradeOutcome {
    if answer.trim().is_empty() {
        return GradeOutcome::zero(json!({ "result": "Incorrect" }));
    }

    let parsed = (
        serde_json::from_str::<Value>(answer),
        serde_json::from_str::<Value>(correct),
    );
    let is_correct = match parsed {
        (Ok(a), Ok(c)) if a.is_object() && c.is_object() => a == c,
        _ => answer.trim().eq_ignore_ascii_case(correct.trim()),
    };

    GradeOutcome {
        score: if is_correct { marks as f64 } else { 0.0 },
        breakdown: json!({
            "result": if is_correct { "Correct" } else { "Incorrect" },
            "selected": answer
        }),
    }
}
