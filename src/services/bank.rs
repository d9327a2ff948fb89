// src/services/bank.rs

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::models::question::{BankItem, QuestionKind};

/// Static pools of authorable question content, one per question type.
///
/// Loaded once at startup and never mutated afterwards. A missing or
/// malformed bank file is a configuration fault that surfaces as a short or
/// empty generated paper, not a crash.
#[derive(Debug, Default)]
pub struct QuestionBank {
    pools: HashMap<QuestionKind, Vec<BankItem>>,
}

impl QuestionBank {
    /// Loads every known bank file from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut pools = HashMap::new();

        for kind in QuestionKind::ALL {
            let path = dir.join(kind.bank_file());
            let items = match fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<Vec<BankItem>>(&raw) {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!("Malformed bank file {:?}: {}", path, e);
                        Vec::new()
                    }
                },
                Err(e) => {
                    tracing::warn!("Bank file {:?} not readable: {}", path, e);
                    Vec::new()
                }
            };
            tracing::info!("Loaded {} items for bank '{}'", items.len(), kind.as_str());
            pools.insert(kind, items);
        }

        QuestionBank { pools }
    }

    /// Constructs a bank from in-memory pools. Used by tests.
    pub fn from_pools(pools: HashMap<QuestionKind, Vec<BankItem>>) -> Self {
        QuestionBank { pools }
    }

    pub fn pool_size(&self, kind: QuestionKind) -> usize {
        self.pools.get(&kind).map_or(0, Vec::len)
    }

    /// Uniform random sample without replacement.
    ///
    /// Requesting more than the pool holds returns the entire pool in
    /// shuffled order; questions are never duplicated to pad a section.
    /// A type with no loaded pool yields an empty list.
    pub fn select<R: Rng + ?Sized>(
        &self,
        kind: QuestionKind,
        count: usize,
        rng: &mut R,
    ) -> Vec<BankItem> {
        let Some(pool) = self.pools.get(&kind) else {
            return Vec::new();
        };

        if count >= pool.len() {
            let mut all = pool.clone();
            all.shuffle(rng);
            return all;
        }

        pool.choose_multiple(rng, count).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn jumble_item(answer: &str) -> BankItem {
        BankItem {
            content: Some(format!("scrambled {}", answer)),
            correct_answer: Some(answer.to_string()),
            ..Default::default()
        }
    }

    fn bank_with_jumble(n: usize) -> QuestionBank {
        let pool = (0..n).map(|i| jumble_item(&format!("answer {}", i))).collect();
        let mut pools = HashMap::new();
        pools.insert(QuestionKind::Jumble, pool);
        QuestionBank::from_pools(pools)
    }

    #[test]
    fn select_returns_requested_count_without_duplicates() {
        let bank = bank_with_jumble(10);
        let mut rng = StdRng::seed_from_u64(7);

        let picked = bank.select(QuestionKind::Jumble, 4, &mut rng);
        assert_eq!(picked.len(), 4);

        let mut answers: Vec<_> = picked
            .iter()
            .map(|i| i.correct_answer.clone().unwrap())
            .collect();
        answers.sort();
        answers.dedup();
        assert_eq!(answers.len(), 4);
    }

    #[test]
    fn select_caps_at_pool_size() {
        let bank = bank_with_jumble(3);
        let mut rng = StdRng::seed_from_u64(7);

        let picked = bank.select(QuestionKind::Jumble, 50, &mut rng);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn select_unknown_kind_is_empty() {
        let bank = bank_with_jumble(3);
        let mut rng = StdRng::seed_from_u64(7);

        let picked = bank.select(QuestionKind::Video, 2, &mut rng);
        assert!(picked.is_empty());
    }
}
