use std::collections::{HashMap, HashSet};

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::RatingsTable;
use crate::ncf::{NcfModel, Tower, UserEmbedding};

/// How the transient user's embedding pair is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    /// Similarity-weighted average of historically similar users' embeddings
    SimilarUsers,
    /// Rating-weighted average of the rated items' embeddings
    RatedItems,
}

/// Failures deriving a user representation from the supplied ratings
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("none of the rated items are known to the model")]
    NoKnownItems,

    #[error("no similar users found for the supplied ratings")]
    NoSimilarUsers,

    #[error("no similar user has embeddings in the model")]
    NoNeighborEmbeddings,
}

/// Derives a single embedding pair for the cold-start user. Purely
/// numeric: no model weights are touched, only embedding lookups.
pub struct EmbeddingSynthesizer<'a> {
    model: &'a NcfModel,
    ratings: &'a RatingsTable,
}

impl<'a> EmbeddingSynthesizer<'a> {
    pub fn new(model: &'a NcfModel, ratings: &'a RatingsTable) -> Self {
        Self { model, ratings }
    }

    pub fn synthesize(
        &self,
        user_ratings: &HashMap<i64, f64>,
        strategy: SynthesisStrategy,
        neighbor_count: usize,
    ) -> Result<UserEmbedding, SynthesisError> {
        match strategy {
            SynthesisStrategy::RatedItems => self.from_rated_items(user_ratings),
            SynthesisStrategy::SimilarUsers => {
                self.from_similar_users(user_ratings, neighbor_count)
            }
        }
    }

    /// Weights each model-known rated item by its rating normalized from
    /// [1,5] to [0,1]; when every weight is zero (all minimum ratings) the
    /// average falls back to uniform.
    fn from_rated_items(
        &self,
        user_ratings: &HashMap<i64, f64>,
    ) -> Result<UserEmbedding, SynthesisError> {
        let mut entries: Vec<(usize, f64)> = user_ratings
            .iter()
            .filter_map(|(&item, &rating)| self.model.item_index(item).map(|idx| (idx, rating)))
            .collect();
        if entries.is_empty() {
            return Err(SynthesisError::NoKnownItems);
        }
        entries.sort_by_key(|(idx, _)| *idx);

        let mut weights: Vec<f64> = entries.iter().map(|(_, r)| (r - 1.0) / 4.0).collect();
        if weights.iter().sum::<f64>() == 0.0 {
            weights = vec![1.0; entries.len()];
        }
        let total: f64 = weights.iter().sum();
        let weighted: Vec<(usize, f64)> = entries
            .iter()
            .zip(&weights)
            .map(|(&(idx, _), &w)| (idx, w / total))
            .collect();

        tracing::debug!(items = weighted.len(), "synthesizing user embedding from rated items");
        Ok(UserEmbedding {
            gmf: self.item_average(Tower::Gmf, &weighted),
            mlp: self.item_average(Tower::Mlp, &weighted),
        })
    }

    /// Averages the embeddings of the most similar historical users,
    /// weighted by cosine similarity of raw rating vectors.
    fn from_similar_users(
        &self,
        user_ratings: &HashMap<i64, f64>,
        neighbor_count: usize,
    ) -> Result<UserEmbedding, SynthesisError> {
        let neighbors = self.similar_users(user_ratings, neighbor_count);
        if neighbors.is_empty() {
            return Err(SynthesisError::NoSimilarUsers);
        }

        let embeddable: Vec<(usize, f64)> = neighbors
            .iter()
            .filter_map(|&(uid, sim)| self.model.user_index(uid).map(|idx| (idx, sim)))
            .collect();
        if embeddable.is_empty() {
            return Err(SynthesisError::NoNeighborEmbeddings);
        }

        let total: f64 = embeddable.iter().map(|(_, s)| s).sum();
        let weighted: Vec<(usize, f64)> = embeddable
            .iter()
            .map(|&(idx, s)| (idx, s / total))
            .collect();

        tracing::debug!(
            neighbors = weighted.len(),
            "synthesizing user embedding from similar users"
        );
        Ok(UserEmbedding {
            gmf: self.user_average(Tower::Gmf, &weighted),
            mlp: self.user_average(Tower::Mlp, &weighted),
        })
    }

    /// Cosine similarity between the transient user's rating vector —
    /// projected onto the historical item universe, unrated items zero —
    /// and every historical user's vector. Returns the top `n` with
    /// strictly positive similarity, best first.
    fn similar_users(&self, user_ratings: &HashMap<i64, f64>, n: usize) -> Vec<(i64, f64)> {
        let known_items: HashSet<i64> = self.ratings.rows().iter().map(|r| r.item_id).collect();
        let projected: HashMap<i64, f64> = user_ratings
            .iter()
            .filter(|(item, _)| known_items.contains(item))
            .map(|(&item, &r)| (item, r))
            .collect();

        let new_norm = projected.values().map(|r| r * r).sum::<f64>().sqrt();
        if new_norm == 0.0 {
            return Vec::new();
        }

        let mut similarities: Vec<(i64, f64)> = self
            .ratings
            .by_user()
            .into_iter()
            .map(|(uid, items)| {
                let dot: f64 = items
                    .iter()
                    .filter_map(|(item, r)| projected.get(item).map(|nr| nr * r))
                    .sum();
                let norm = items.iter().map(|(_, r)| r * r).sum::<f64>().sqrt();
                let similarity = if norm == 0.0 {
                    0.0
                } else {
                    dot / (norm * new_norm)
                };
                (uid, similarity)
            })
            .collect();

        similarities.retain(|(_, s)| *s > 0.0);
        similarities.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        similarities.truncate(n);
        similarities
    }

    fn item_average(&self, tower: Tower, weighted: &[(usize, f64)]) -> Array1<f64> {
        let dim = self.tower_dim(tower);
        let mut acc = Array1::zeros(dim);
        for &(idx, w) in weighted {
            acc.scaled_add(w, &self.model.embed_item(tower, idx));
        }
        acc
    }

    fn user_average(&self, tower: Tower, weighted: &[(usize, f64)]) -> Array1<f64> {
        let dim = self.tower_dim(tower);
        let mut acc = Array1::zeros(dim);
        for &(idx, w) in weighted {
            acc.scaled_add(w, &self.model.embed_user(tower, idx));
        }
        acc
    }

    fn tower_dim(&self, tower: Tower) -> usize {
        match tower {
            Tower::Gmf => self.model.n_factors(),
            Tower::Mlp => self.model.mlp_embed_dim(),
        }
    }
}
