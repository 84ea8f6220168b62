use crate::models::Prediction;
use crate::ncf::{NcfModel, Tower, UserEmbedding};

/// Score assigned to every candidate when the frozen scoring network is
/// unavailable: a documented degradation, not silent data loss.
const NEUTRAL_SCORE: f64 = 0.5;

/// Score assigned to items outside the model's vocabulary
const UNKNOWN_ITEM_SCORE: f64 = 0.0;

/// Forward-evaluates the frozen scoring network over every candidate in
/// bounded batches. Batching caps peak memory, not concurrency — the loop
/// is synchronous.
pub struct BatchScorer<'a> {
    model: &'a NcfModel,
    batch_size: usize,
}

impl<'a> BatchScorer<'a> {
    pub fn new(model: &'a NcfModel, batch_size: usize) -> Self {
        Self {
            model,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns one score per candidate, aligned with the input order.
    /// Unknown items deterministically score 0.0; a missing scoring
    /// network degrades every candidate to the neutral 0.5.
    pub fn score(&self, user: &UserEmbedding, candidates: &[i64]) -> Vec<f64> {
        let network = match self.model.scoring_network() {
            Some(network) => network,
            None => {
                tracing::warn!(
                    candidates = candidates.len(),
                    "scoring network unavailable; returning neutral scores"
                );
                return vec![NEUTRAL_SCORE; candidates.len()];
            }
        };

        let mut scores = Vec::with_capacity(candidates.len());
        let batches = candidates.len().div_ceil(self.batch_size);
        for (i, batch) in candidates.chunks(self.batch_size).enumerate() {
            for &item_id in batch {
                match self.model.item_index(item_id) {
                    Some(idx) => scores.push(network.forward(
                        user.gmf.view(),
                        self.model.embed_item(Tower::Gmf, idx),
                        user.mlp.view(),
                        self.model.embed_item(Tower::Mlp, idx),
                    )),
                    None => scores.push(UNKNOWN_ITEM_SCORE),
                }
            }
            tracing::debug!(batch = i + 1, total = batches, "scored batch");
        }
        scores
    }

    /// Scores candidates and pairs each with its id
    pub fn predictions(&self, user: &UserEmbedding, candidates: &[i64]) -> Vec<Prediction> {
        self.score(user, candidates)
            .into_iter()
            .zip(candidates)
            .map(|(score, &item_id)| Prediction::new(item_id, score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    use crate::ncf::{DenseLayer, ModelAsset};

    fn asset() -> ModelAsset {
        ModelAsset {
            n_factors: 1,
            mlp_embed_dim: 1,
            user_ids: vec![],
            item_ids: vec![1, 2],
            gmf_user_embeddings: vec![],
            gmf_item_embeddings: vec![vec![1.0], vec![-1.0]],
            mlp_user_embeddings: vec![],
            mlp_item_embeddings: vec![vec![1.0], vec![-1.0]],
            hidden_layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0], vec![1.0]],
                    biases: vec![0.0],
                },
                DenseLayer {
                    weights: vec![vec![1.0]],
                    biases: vec![0.0],
                },
            ],
            output_weights: vec![1.0, 1.0],
        }
    }

    fn user() -> UserEmbedding {
        UserEmbedding {
            gmf: Array1::from_vec(vec![1.0]),
            mlp: Array1::from_vec(vec![1.0]),
        }
    }

    #[test]
    fn test_scores_aligned_and_bounded() {
        let model = NcfModel::from_asset(asset()).unwrap();
        let scorer = BatchScorer::new(&model, 1);

        let scores = scorer.score(&user(), &[1, 2]);
        assert_eq!(scores.len(), 2);
        for score in &scores {
            assert!(*score > 0.0 && *score < 1.0);
        }
        // Item 1 aligns with the user embedding, item 2 opposes it.
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_unknown_item_scores_zero() {
        let model = NcfModel::from_asset(asset()).unwrap();
        let scorer = BatchScorer::new(&model, 100);

        let scores = scorer.score(&user(), &[1, 999, 2]);
        assert_eq!(scores[1], 0.0);
        assert!(scores[0] > 0.0);
    }

    #[test]
    fn test_missing_network_degrades_to_neutral() {
        let mut bad = asset();
        bad.hidden_layers.pop();
        let model = NcfModel::from_asset(bad).unwrap();
        let scorer = BatchScorer::new(&model, 10);

        let scores = scorer.score(&user(), &[1, 2, 999]);
        assert_eq!(scores, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_predictions_keep_input_order() {
        let model = NcfModel::from_asset(asset()).unwrap();
        let scorer = BatchScorer::new(&model, 2);

        let predictions = scorer.predictions(&user(), &[2, 1]);
        assert_eq!(predictions[0].item_id, 2);
        assert_eq!(predictions[1].item_id, 1);
    }
}
