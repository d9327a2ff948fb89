// src/models/question.rs

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::prelude::FromRow;

/// Fixed enumeration of question types backed by static banks.
///
/// Serialized in kebab-case to match the bank file names and the
/// `type` tags stored inside session JSONB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    Video,
    Image,
    Reading,
    Jumble,
    McqGrammar,
    McqContext,
    McqReading,
}

impl QuestionKind {
    pub const ALL: [QuestionKind; 7] = [
        QuestionKind::Video,
        QuestionKind::Image,
        QuestionKind::Reading,
        QuestionKind::Jumble,
        QuestionKind::McqGrammar,
        QuestionKind::McqContext,
        QuestionKind::McqReading,
    ];

    /// Parses a stored type tag. Returns `None` for unknown tags; callers
    /// decide whether that means MCQ-by-prefix or manual review.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "video" => Some(QuestionKind::Video),
            "image" => Some(QuestionKind::Image),
            "reading" => Some(QuestionKind::Reading),
            "jumble" => Some(QuestionKind::Jumble),
            "mcq-grammar" => Some(QuestionKind::McqGrammar),
            "mcq-context" => Some(QuestionKind::McqContext),
            "mcq-reading" => Some(QuestionKind::McqReading),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Video => "video",
            QuestionKind::Image => "image",
            QuestionKind::Reading => "reading",
            QuestionKind::Jumble => "jumble",
            QuestionKind::McqGrammar => "mcq-grammar",
            QuestionKind::McqContext => "mcq-context",
            QuestionKind::McqReading => "mcq-reading",
        }
    }

    /// Bank file holding this type's pool, relative to the bank directory.
    pub fn bank_file(&self) -> &'static str {
        match self {
            QuestionKind::Video => "video.json",
            QuestionKind::Image => "image.json",
            QuestionKind::Reading => "reading.json",
            QuestionKind::Jumble => "jumble.json",
            QuestionKind::McqGrammar => "mcq_grammar.json",
            QuestionKind::McqContext => "mcq_context.json",
            QuestionKind::McqReading => "mcq_reading.json",
        }
    }

    pub fn is_mcq(&self) -> bool {
        self.as_str().starts_with("mcq")
    }
}

/// Grading specification attached to a generated question.
/// Hidden from candidates; only the grading pipeline reads it.
///
/// Untagged: jumble/MCQ entries carry a canonical `correct_answer`,
/// free-text entries carry a reference answer plus key ideas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GradingConfig {
    Key {
        correct_answer: String,
    },
    Rubric {
        #[serde(default)]
        reference: String,
        #[serde(default)]
        key_ideas: Vec<String>,
    },
}

impl GradingConfig {
    pub fn correct_answer(&self) -> &str {
        match self {
            GradingConfig::Key { correct_answer } => correct_answer,
            GradingConfig::Rubric { .. } => "",
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            GradingConfig::Key { .. } => "",
            GradingConfig::Rubric { reference, .. } => reference,
        }
    }

    pub fn key_ideas(&self) -> &[String] {
        match self {
            GradingConfig::Key { .. } => &[],
            GradingConfig::Rubric { key_ideas, .. } => key_ideas,
        }
    }

    /// The "correct answer" text shown in the audit breakdown.
    pub fn display_answer(&self) -> &str {
        match self {
            GradingConfig::Key { correct_answer } => correct_answer,
            GradingConfig::Rubric { reference, .. } => reference,
        }
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        GradingConfig::Rubric {
            reference: String::new(),
            key_ideas: Vec::new(),
        }
    }
}

/// One entry of a static question bank file.
///
/// The banks are legacy-authored JSON, so most fields are optional and the
/// mapping per type tolerates older field names (e.g. `prompt` instead of
/// `title`, `question_text` instead of `content`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BankItem {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub passage: Option<String>,
    pub reference_summary: Option<String>,
    pub reference_context: Option<String>,
    pub key_ideas: Option<Vec<String>>,
    pub content: Option<String>,
    pub question_text: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
}

impl BankItem {
    /// Splits a bank entry into the candidate-visible content and the
    /// hidden grading specification for the given type.
    pub fn to_question_parts(&self, kind: QuestionKind) -> (Value, GradingConfig) {
        match kind {
            QuestionKind::Video => {
                let content = json!({
                    "url": self.video_url,
                    "title": self.title.clone()
                        .or_else(|| self.prompt.clone())
                        .unwrap_or_else(|| "Video description task".to_string()),
                });
                (content, self.rubric_config())
            }
            QuestionKind::Image => {
                let content = json!({
                    "url": self.image_url.clone().or_else(|| self.video_url.clone()),
                    "title": self.title.clone()
                        .or_else(|| self.prompt.clone())
                        .unwrap_or_else(|| "Image description task".to_string()),
                });
                (content, self.rubric_config())
            }
            QuestionKind::Reading => {
                let content = json!({
                    "passage": self.passage,
                    "title": self.title,
                });
                let grading = GradingConfig::Rubric {
                    reference: self.reference_summary.clone().unwrap_or_default(),
                    key_ideas: self.key_ideas.clone().unwrap_or_default(),
                };
                (content, grading)
            }
            QuestionKind::Jumble => {
                let content = json!({ "sentence": self.content });
                let grading = GradingConfig::Key {
                    correct_answer: self.correct_answer.clone().unwrap_or_default(),
                };
                (content, grading)
            }
            QuestionKind::McqGrammar | QuestionKind::McqContext | QuestionKind::McqReading => {
                let content = json!({
                    "question": self.content.clone().or_else(|| self.question_text.clone()),
                    "options": self.options,
                });
                let grading = GradingConfig::Key {
                    correct_answer: self.correct_answer.clone().unwrap_or_default(),
                };
                (content, grading)
            }
        }
    }

    fn rubric_config(&self) -> GradingConfig {
        GradingConfig::Rubric {
            reference: self
                .reference_context
                .clone()
                .or_else(|| self.correct_answer.clone())
                .unwrap_or_default(),
            key_ideas: self.key_ideas.clone().unwrap_or_default(),
        }
    }
}

/// A question instance bound to one exam session.
///
/// Created once at session start and stored as JSONB on the session; never
/// regenerated, so a page refresh re-serves the identical set. The type is
/// kept as a plain tag so sessions survive bank types this binary does not
/// know yet (those fall to the manual-review grading path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    /// Session-scoped sequential id, unique within the session.
    pub temp_id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    /// Candidate-visible content (shape depends on the type).
    pub content: Value,
    /// Hidden grading specification.
    pub grading_config: GradingConfig,
    pub marks: i32,
}

impl GeneratedQuestion {
    /// Best-effort human-readable question text for the audit breakdown.
    pub fn display_text(&self) -> String {
        for field in ["passage", "question", "sentence", "text", "title", "url"] {
            if let Some(s) = self.content.get(field).and_then(|v| v.as_str()) {
                if !s.is_empty() {
                    return s.to_string();
                }
            }
        }
        String::new()
    }
}

/// Represents the 'questions' table (legacy fixed-question tests).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub test_id: i64,
    pub question_type: String,
    pub marks: i32,
    pub content: sqlx::types::Json<Value>,
    pub grading_config: sqlx::types::Json<Value>,
}

impl Question {
    /// Lifts a legacy row into the common generated-question shape so the
    /// submission pipeline has a single code path.
    pub fn to_generated(&self) -> GeneratedQuestion {
        let grading = serde_json::from_value(self.grading_config.0.clone())
            .unwrap_or_default();
        GeneratedQuestion {
            temp_id: self.id,
            question_type: self.question_type.clone(),
            content: self.content.0.clone(),
            grading_config: grading,
            marks: self.marks,
        }
    }
}

/// Candidate-safe view of a question (grading config stripped).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: Value,
    pub marks: i32,
}

impl From<&GeneratedQuestion> for PublicQuestion {
    fn from(q: &GeneratedQuestion) -> Self {
        PublicQuestion {
            id: q.temp_id,
            question_type: q.question_type.clone(),
            content: q.content.clone(),
            marks: q.marks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grading_config_untagged_roundtrip() {
        let key: GradingConfig =
            serde_json::from_value(json!({ "correct_answer": "Paris" })).unwrap();
        assert_eq!(key.correct_answer(), "Paris");

        let rubric: GradingConfig = serde_json::from_value(json!({
            "reference": "A cat sits on a mat.",
            "key_ideas": ["cat", "mat"]
        }))
        .unwrap();
        assert_eq!(rubric.reference(), "A cat sits on a mat.");
        assert_eq!(rubric.key_ideas().len(), 2);
        assert_eq!(rubric.correct_answer(), "");
    }

    #[test]
    fn bank_item_maps_mcq_fields() {
        let item = BankItem {
            question_text: Some("Pick one".to_string()),
            options: Some(vec!["A".to_string(), "B".to_string()]),
            correct_answer: Some("A".to_string()),
            ..Default::default()
        };
        let (content, grading) = item.to_question_parts(QuestionKind::McqReading);
        assert_eq!(content["question"], "Pick one");
        assert_eq!(grading.correct_answer(), "A");
    }

    #[test]
    fn bank_item_video_falls_back_to_correct_answer() {
        let item = BankItem {
            video_url: Some("/static/videos/v1.mp4".to_string()),
            prompt: Some("Describe the clip".to_string()),
            correct_answer: Some("A man walks to the door.".to_string()),
            ..Default::default()
        };
        let (content, grading) = item.to_question_parts(QuestionKind::Video);
        assert_eq!(content["title"], "Describe the clip");
        assert_eq!(grading.reference(), "A man walks to the door.");
    }

    #[test]
    fn kind_parse_rejects_unknown() {
        assert_eq!(QuestionKind::parse("video"), Some(QuestionKind::Video));
        assert_eq!(QuestionKind::parse("mcq-grammar"), Some(QuestionKind::McqGrammar));
        assert_eq!(QuestionKind::parse("cognitive"), None);
    }
}
