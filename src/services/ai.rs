// src/services/ai.rs

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::config::{Config, KEY_IDEA_THRESHOLD, MODEL_WORKERS};

/// Failure of an external model call (network, API, unparseable payload).
///
/// Never mapped to an HTTP error: the grading pipeline degrades it into a
/// zero-score breakdown entry instead.
#[derive(Debug)]
pub struct ModelError(pub String);

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model call failed: {}", self.0)
    }
}

impl std::error::Error for ModelError {}

/// Semantic similarity collaborator backed by an embedding model.
#[async_trait]
pub trait SimilarityModel: Send + Sync {
    /// Cosine similarity in [0, 1]. Returns 0.0 without invoking the model
    /// when either text is blank.
    async fn similarity(&self, a: &str, b: &str) -> Result<f32, ModelError>;

    /// Fraction of ideas whose similarity to `text` exceeds the fixed
    /// threshold. Trivially 1.0 for an empty idea list.
    async fn key_idea_coverage(&self, text: &str, ideas: &[String]) -> Result<f32, ModelError>;
}

/// Generative judge collaborator.
#[async_trait]
pub trait JudgeModel: Send + Sync {
    /// Runs the rubric prompt through the judge and parses its response.
    ///
    /// Exception-free at the boundary: a failed call or malformed response
    /// yields a safe default object so one bad judge reply cannot fail a
    /// whole batch grading run.
    async fn judge(&self, prompt: &str) -> Value;
}

/// Shared client for all external model calls.
///
/// Constructed once at startup and shared by reference. The semaphore is
/// the bounded worker pool: at most `MODEL_WORKERS` embedding/judge calls
/// are in flight at a time, so slow model calls cannot starve unrelated
/// request handling. Callers always await completion.
pub struct AiEngine {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    limiter: Semaphore,
}

impl AiEngine {
    pub fn new(config: &Config) -> Self {
        AiEngine {
            client: reqwest::Client::new(),
            api_key: config.judge_api_key.clone(),
            api_base: config.judge_api_base.clone(),
            limiter: Semaphore::new(MODEL_WORKERS),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let url = format!(
            "{}/models/text-embedding-004:embedContent?key={}",
            self.api_base, self.api_key
        );
        let body = json!({
            "model": "models/text-embedding-004",
            "content": { "parts": [{ "text": text }] }
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ModelError(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ModelError(format!("embedding API status {}", res.status())));
        }

        let payload: Value = res.json().await.map_err(|e| ModelError(e.to_string()))?;
        let values = payload
            .get("embedding")
            .and_then(|e| e.get("values"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| ModelError("embedding response missing values".to_string()))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect())
    }

    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!(
            "{}/models/gemini-2.0-flash:generateContent?key={}",
            self.api_base, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| ModelError(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ModelError(format!("judge API status {}", res.status())));
        }

        let payload: Value = res.json().await.map_err(|e| ModelError(e.to_string()))?;
        payload
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError("judge response missing text".to_string()))
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, ModelError> {
        self.limiter
            .acquire()
            .await
            .map_err(|e| ModelError(e.to_string()))
    }
}

#[async_trait]
impl SimilarityModel for AiEngine {
    async fn similarity(&self, a: &str, b: &str) -> Result<f32, ModelError> {
        if a.trim().is_empty() || b.trim().is_empty() {
            return Ok(0.0);
        }

        let _permit = self.acquire().await?;
        let ea = self.embed(a).await?;
        let eb = self.embed(b).await?;
        Ok(cosine_similarity(&ea, &eb))
    }

    async fn key_idea_coverage(&self, text: &str, ideas: &[String]) -> Result<f32, ModelError> {
        if ideas.is_empty() {
            return Ok(1.0);
        }
        if text.trim().is_empty() {
            return Ok(0.0);
        }

        let _permit = self.acquire().await?;
        let text_embedding = self.embed(text).await?;

        let mut matched = 0usize;
        for idea in ideas {
            let idea_embedding = self.embed(idea).await?;
            if cosine_similarity(&text_embedding, &idea_embedding) > KEY_IDEA_THRESHOLD {
                matched += 1;
            }
        }

        Ok((matched as f32 / ideas.len() as f32).min(1.0))
    }
}

#[async_trait]
impl JudgeModel for AiEngine {
    async fn judge(&self, prompt: &str) -> Value {
        let result = async {
            let _permit = self.acquire().await?;
            let text = self.generate(prompt).await?;
            parse_judge_response(&text)
                .ok_or_else(|| ModelError("judge response was not valid JSON".to_string()))
        }
        .await;

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Judge call failed: {}", e);
                json!({
                    "total_score": 0,
                    "passed": false,
                    "feedback": format!("Evaluation Error: {}", e.0)
                })
            }
        }
    }
}

/// Cosine similarity of two embedding vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Parses the judge's textual reply as JSON after stripping the markdown
/// code fences some models wrap their output in.
pub fn parse_judge_response(text: &str) -> Option<Value> {
    let cleaned = text.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim()).ok()
}

/// 15-point rubric prompt for video description answers.
pub fn video_prompt(answer: &str, reference: &str, context: &str) -> String {
    format!(
        r#"You are a STRICT English teacher grading a proficiency test. You do not give participation points.

VIDEO DESCRIPTION: {context}
CORRECT ANSWER: "{reference}"
USER'S ANSWER: "{answer}"

TOTAL MARKS: 15

Rubric:
1. GRAMMAR & STRUCTURE (0-4): deduct per missing article, wrong preposition or incomplete sentence.
2. VOCABULARY & WORD CHOICE (0-4): wrong or generic objects lose marks.
3. CLARITY & MEANING (0-3): must match the correct answer's meaning.
4. INSTRUCTION COMPLIANCE (0 or 2): all or nothing, exact required phrasing.
5. SPELLING & FORMATTING (0-2): one error -1, two or more 0.

Wrong main content caps the total at 6/15. Vague answers cap at 10/15.

Output MUST be valid JSON in this exact format:
{{
    "grammar_structure_score": 0-4,
    "vocabulary_word_choice_score": 0-4,
    "clarity_meaning_score": 0-3,
    "instruction_compliance_score": 0 or 2,
    "spelling_formatting_score": 0-2,
    "total_score": 0-15,
    "passed": true/false (true if >= 11),
    "feedback": "Specific feedback explaining deductions",
    "grade_justification": "Brief breakdown of scores"
}}"#
    )
}

/// Same rubric as video, focused on visual description.
pub fn image_prompt(answer: &str, reference: &str, context: &str) -> String {
    format!(
        r#"You are a STRICT English teacher grading a proficiency test. You do not give participation points.

IMAGE DESCRIPTION: {context}
CORRECT ANSWER: "{reference}"
USER'S ANSWER: "{answer}"

TOTAL MARKS: 15

Rubric:
1. GRAMMAR & STRUCTURE (0-4).
2. VOCABULARY & OBJECT IDENTIFICATION (0-4): wrong object scores 0 here.
3. CLARITY & DETAIL (0-3): must match the image accurately.
4. INSTRUCTION COMPLIANCE (0 or 2): binary, exact required format.
5. SPELLING & FORMATTING (0-2).

Wrong content caps the total at 6/15. Vague answers cap at 10/15.

Output MUST be valid JSON in this exact format:
{{
    "grammar_structure_score": 0-4,
    "vocabulary_word_choice_score": 0-4,
    "clarity_meaning_score": 0-3,
    "instruction_compliance_score": 0 or 2,
    "spelling_formatting_score": 0-2,
    "total_score": 0-15,
    "passed": true/false (true if >= 11),
    "feedback": "Specific feedback explaining deductions",
    "grade_justification": "Brief breakdown of scores"
}}"#
    )
}

/// 15-point rubric prompt for reading summaries. The passage is capped to
/// keep the prompt bounded.
pub fn reading_prompt(summary: &str, passage: &str, reference: &str, key_ideas: &[String]) -> String {
    let ideas = if key_ideas.is_empty() {
        "Not specified".to_string()
    } else {
        key_ideas.join(", ")
    };
    let passage_excerpt: String = passage.chars().take(500).collect();

    format!(
        r#"You are a STRICT English teacher grading a reading comprehension summary. Be harsh but fair.

ORIGINAL PASSAGE: "{passage_excerpt}..."
REFERENCE SUMMARY: "{reference}"
KEY IDEAS TO COVER: {ideas}
USER'S SUMMARY: "{summary}"

TOTAL MARKS: 15

Rubric:
1. KEY IDEA COVERAGE (0-5): one mark per key idea correctly mentioned.
2. PARAPHRASING QUALITY (0-4): direct copying scores 0 here.
3. GRAMMAR & STRUCTURE (0-3).
4. COHERENCE & FLOW (0-2).
5. VOCABULARY PRECISION (0-1).

Copying from the passage caps the total at 5/15. Missing half the key ideas caps at 8/15.

Output MUST be valid JSON in this exact format:
{{
    "key_idea_coverage_score": 0-5,
    "paraphrasing_score": 0-4,
    "grammar_structure_score": 0-3,
    "coherence_flow_score": 0-2,
    "vocabulary_precision_score": 0-1,
    "total_score": 0-15,
    "passed": true/false (true if >= 11),
    "key_ideas_found": ["key ideas the student mentioned"],
    "key_ideas_missing": ["key ideas the student missed"],
    "feedback": "Specific feedback on summary quality",
    "grade_justification": "Brief breakdown of scores"
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = [0.5, 0.2, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn parse_strips_markdown_fences() {
        let raw = "```json\n{\"total_score\": 12, \"passed\": true}\n```";
        let parsed = parse_judge_response(raw).unwrap();
        assert_eq!(parsed["total_score"], 12);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse_judge_response("the student did well").is_none());
    }

    // The engine's own short-circuits must answer without reaching the
    // network, so an unroutable api_base proves they fire first.
    fn offline_engine() -> AiEngine {
        let config = Config {
            database_url: String::new(),
            jwt_secret: String::new(),
            jwt_expiration: 0,
            rust_log: "error".to_string(),
            bank_dir: String::new(),
            judge_api_key: String::new(),
            judge_api_base: "http://127.0.0.1:1".to_string(),
            admin_email: None,
            admin_password: None,
        };
        AiEngine::new(&config)
    }

    #[tokio::test]
    async fn blank_text_similarity_is_zero_without_a_model_call() {
        let engine = offline_engine();
        assert_eq!(engine.similarity("", "some text").await.unwrap(), 0.0);
        assert_eq!(engine.similarity("some text", "   ").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn empty_idea_list_counts_as_fully_covered() {
        let engine = offline_engine();
        assert_eq!(engine.key_idea_coverage("a summary", &[]).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn blank_text_covers_no_ideas() {
        let engine = offline_engine();
        let ideas = vec!["fox".to_string()];
        assert_eq!(engine.key_idea_coverage("   ", &ideas).await.unwrap(), 0.0);
    }
}
