use crate::models::Candidate;
use crate::services::features::ItemFeatures;
use crate::services::similarity::dense_cosine;
use tracing::debug;

/// Diversity Optimizer - 多樣性重排
/// 使用 MMR (Maximal Marginal Relevance) 算法
///
/// Greedily picks the remaining candidate maximizing
/// `λ · relevance − (1 − λ) · max similarity to already chosen`,
/// where similarity is the cosine of item feature vectors.
/// The output is always a permutation of the input.
pub struct DiversityOptimizer {
    lambda: f64, // 平衡 relevance 和 diversity 的參數（0~1）
}

impl DiversityOptimizer {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda: if lambda.is_finite() {
                lambda.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// 重排候選集以提高多樣性
    /// lambda = 0.0: 不重排（原順序返回）
    /// lambda = 1.0: 只看相關性（等同原順序）
    ///
    /// Relevance is rank based (`1 − position / len`) so candidates coming
    /// from differently scaled sources stay comparable.
    pub fn rerank(&self, candidates: Vec<Candidate>, features: &ItemFeatures) -> Vec<Candidate> {
        if self.lambda <= 0.0 || candidates.len() < 2 {
            return candidates;
        }

        let len = candidates.len() as f64;
        let mut remaining: Vec<(f64, Candidate)> = candidates
            .into_iter()
            .enumerate()
            .map(|(pos, c)| (1.0 - pos as f64 / len, c))
            .collect();
        let mut selected: Vec<Candidate> = Vec::with_capacity(remaining.len());

        // MMR 貪心選擇
        while !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_mmr_score = f64::NEG_INFINITY;

            for (i, (relevance, candidate)) in remaining.iter().enumerate() {
                let redundancy = self.max_similarity(candidate, &selected, features);
                let mmr_score = self.lambda * relevance - (1.0 - self.lambda) * redundancy;

                // strict comparison keeps input order on ties
                if mmr_score > best_mmr_score {
                    best_mmr_score = mmr_score;
                    best_idx = i;
                }
            }

            let (_, chosen) = remaining.remove(best_idx);
            selected.push(chosen);
        }

        debug!(
            lambda = self.lambda,
            candidates = selected.len(),
            "Diversity re-ranking applied"
        );

        selected
    }

    /// 與已選擇物品的最大相似度；缺少特徵向量時為 0
    fn max_similarity(
        &self,
        candidate: &Candidate,
        selected: &[Candidate],
        features: &ItemFeatures,
    ) -> f64 {
        let Some(vector) = features.vector(candidate.item_id) else {
            return 0.0;
        };

        selected
            .iter()
            .filter_map(|s| features.vector(s.item_id))
            .map(|other| dense_cosine(&vector.values, &other.values))
            .fold(0.0, f64::max)
    }
}
