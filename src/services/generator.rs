// src/services/generator.rs

use rand::Rng;

use crate::models::question::{GeneratedQuestion, QuestionKind};
use crate::models::test::TemplateSection;
use crate::services::bank::QuestionBank;

/// Declared total marks of a template: Σ(count × marks) over its sections.
pub fn template_total_marks(sections: &[TemplateSection]) -> i32 {
    sections
        .iter()
        .map(|s| s.count as i32 * s.marks)
        .sum()
}

/// Builds a candidate's randomized question set from the template sections.
///
/// Each section samples `count` items from its bank without replacement.
/// `temp_id` increases monotonically across the whole session, continuing
/// through section boundaries, so every id is unique within the session.
/// A section whose type has no bank contributes nothing; the resulting
/// short paper is the admin's configuration fault to notice, not a crash.
pub fn generate_question_set<R: Rng + ?Sized>(
    sections: &[TemplateSection],
    bank: &QuestionBank,
    rng: &mut R,
) -> Vec<GeneratedQuestion> {
    let mut questions = Vec::new();
    let mut temp_id: i64 = 1;

    for section in sections {
        let Some(kind) = QuestionKind::parse(&section.kind) else {
            tracing::warn!("Template section with unknown type '{}'", section.kind);
            continue;
        };

        let items = bank.select(kind, section.count as usize, rng);
        if items.len() < section.count as usize {
            tracing::warn!(
                "Bank '{}' holds only {} items, section asked for {}",
                kind.as_str(),
                items.len(),
                section.count
            );
        }

        for item in items {
            let (content, grading_config) = item.to_question_parts(kind);
            questions.push(GeneratedQuestion {
                temp_id,
                question_type: kind.as_str().to_string(),
                content,
                grading_config,
                marks: section.marks,
            });
            temp_id += 1;
        }
    }

    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::BankItem;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn bank() -> QuestionBank {
        let jumble: Vec<BankItem> = (0..5)
            .map(|i| BankItem {
                content: Some(format!("jumbled {}", i)),
                correct_answer: Some(format!("answer {}", i)),
                ..Default::default()
            })
            .collect();
        let mcq: Vec<BankItem> = (0..5)
            .map(|i| BankItem {
                question_text: Some(format!("question {}", i)),
                options: Some(vec!["A".into(), "B".into()]),
                correct_answer: Some("A".into()),
                ..Default::default()
            })
            .collect();

        let mut pools = HashMap::new();
        pools.insert(QuestionKind::Jumble, jumble);
        pools.insert(QuestionKind::McqGrammar, mcq);
        QuestionBank::from_pools(pools)
    }

    fn sections() -> Vec<TemplateSection> {
        vec![
            TemplateSection { kind: "jumble".into(), count: 3, marks: 5 },
            TemplateSection { kind: "mcq-grammar".into(), count: 2, marks: 10 },
        ]
    }

    #[test]
    fn total_marks_is_sum_of_sections() {
        assert_eq!(template_total_marks(&sections()), 3 * 5 + 2 * 10);
    }

    #[test]
    fn temp_ids_are_sequential_across_sections() {
        let mut rng = StdRng::seed_from_u64(42);
        let set = generate_question_set(&sections(), &bank(), &mut rng);

        assert_eq!(set.len(), 5);
        let ids: Vec<i64> = set.iter().map(|q| q.temp_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        // Section boundaries keep their order and marks.
        assert!(set[..3].iter().all(|q| q.question_type == "jumble" && q.marks == 5));
        assert!(set[3..].iter().all(|q| q.question_type == "mcq-grammar" && q.marks == 10));
    }

    #[test]
    fn generated_marks_sum_matches_template() {
        let mut rng = StdRng::seed_from_u64(42);
        let set = generate_question_set(&sections(), &bank(), &mut rng);
        let generated: i32 = set.iter().map(|q| q.marks).sum();
        assert_eq!(generated, template_total_marks(&sections()));
    }

    #[test]
    fn unknown_section_type_is_skipped() {
        let mut rng = StdRng::seed_from_u64(42);
        let secs = vec![TemplateSection { kind: "cognitive".into(), count: 2, marks: 5 }];
        let set = generate_question_set(&secs, &bank(), &mut rng);
        assert!(set.is_empty());
    }

    #[test]
    fn oversized_section_takes_whole_pool() {
        let mut rng = StdRng::seed_from_u64(42);
        let secs = vec![TemplateSection { kind: "jumble".into(), count: 50, marks: 2 }];
        let set = generate_question_set(&secs, &bank(), &mut rng);
        assert_eq!(set.len(), 5);
    }
}
