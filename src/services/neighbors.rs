use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::{Catalog, RatingsTable};
use crate::models::{rank_descending, Prediction, Preferences};
use crate::ncf::IdIndex;

/// Tuning for the neighbor engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// Top-K users kept as the neighborhood
    pub neighbor_count: usize,
    /// Shrinkage constant λ: similarity is scaled by n/(n+λ) where n is
    /// the co-rated item count, down-weighting thin-overlap estimates
    pub shrinkage: f64,
    /// Number of predictions returned
    pub top_n: usize,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            neighbor_count: 20,
            shrinkage: 10.0,
            top_n: 10,
        }
    }
}

/// Failures inside the neighbor engine. The composer catches these and
/// degrades the CF path to an empty list so the NCF path still answers.
#[derive(thiserror::Error, Debug)]
pub enum NeighborCfError {
    #[error("historical ratings table is empty")]
    EmptyRatings,

    #[error("transient user supplied no ratings")]
    NoUserRatings,
}

/// One user's row of the sparse interaction matrix: entries sorted by item
/// index, zero meaning "no rating" rather than a rating of zero.
struct UserRow {
    entries: Vec<(usize, f64)>,
    mean: f64,
}

impl UserRow {
    fn new(mut entries: Vec<(usize, f64)>) -> Self {
        entries.sort_by_key(|(idx, _)| *idx);
        let mean = if entries.is_empty() {
            0.0
        } else {
            entries.iter().map(|(_, r)| r).sum::<f64>() / entries.len() as f64
        };
        Self { entries, mean }
    }

    fn rating_of(&self, item: usize) -> Option<f64> {
        self.entries
            .binary_search_by_key(&item, |(idx, _)| *idx)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// L2 norm of the mean-centered nonzero entries
    fn centered_norm(&self) -> f64 {
        self.entries
            .iter()
            .map(|(_, r)| (r - self.mean).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// User-based collaborative filtering over a per-request sparse matrix.
///
/// The matrix is rebuilt on every call because the transient user changes
/// its shape; nothing here is cached across requests. Centering each user's
/// nonzero entries before the cosine makes the similarity an approximation
/// of Pearson correlation without densifying the zeros.
pub struct SparseNeighborCf<'a> {
    catalog: &'a Catalog,
    ratings: &'a RatingsTable,
    config: NeighborConfig,
}

impl<'a> SparseNeighborCf<'a> {
    pub fn new(catalog: &'a Catalog, ratings: &'a RatingsTable, config: NeighborConfig) -> Self {
        Self {
            catalog,
            ratings,
            config,
        }
    }

    /// Predicts ratings for the transient user's unrated items and returns
    /// the top `top_n`, each clamped to [1,5].
    pub fn recommend(
        &self,
        user_ratings: &HashMap<i64, f64>,
        prefs: &Preferences,
    ) -> Result<Vec<Prediction>, NeighborCfError> {
        if user_ratings.is_empty() {
            return Err(NeighborCfError::NoUserRatings);
        }
        if self.ratings.is_empty() {
            return Err(NeighborCfError::EmptyRatings);
        }

        let transient_id = self.ratings.max_user_id().unwrap_or(0) + 1;

        // Index every item appearing in the augmented table.
        let mut items = IdIndex::empty();

        let grouped = self.ratings.by_user();
        let mut rows: Vec<UserRow> = Vec::with_capacity(grouped.len());
        for (_, user_items) in &grouped {
            let entries = user_items
                .iter()
                .map(|&(item, r)| (items.intern(item), r))
                .collect();
            rows.push(UserRow::new(entries));
        }

        let mut sorted_user: Vec<(i64, f64)> = user_ratings.iter().map(|(&i, &r)| (i, r)).collect();
        sorted_user.sort_by_key(|(item, _)| *item);
        let transient_entries: Vec<(usize, f64)> = sorted_user
            .iter()
            .map(|&(item, r)| (items.intern(item), r))
            .collect();
        let transient = UserRow::new(transient_entries);

        tracing::debug!(
            users = rows.len() + 1,
            items = items.len(),
            transient_id,
            "sparse interaction matrix built"
        );

        let neighbors = self.select_neighbors(&transient, &rows);
        tracing::debug!(neighbors = neighbors.len(), "neighborhood selected");

        let targets = self.prediction_targets(&transient, &items, prefs);
        let mut predictions = Vec::new();
        for target in targets {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for &(row, weight) in &neighbors {
                if let Some(rating) = rows[row].rating_of(target) {
                    numerator += weight * (rating - rows[row].mean);
                    denominator += weight.abs();
                }
            }
            // Zero overlap with the neighborhood: no prediction at all.
            if denominator > 0.0 {
                let predicted = (transient.mean + numerator / denominator).clamp(1.0, 5.0);
                predictions.push(Prediction::new(items.id_at(target), predicted));
            }
        }

        Ok(rank_descending(predictions, self.config.top_n))
    }

    /// Top-K rows by shrinkage-adjusted centered cosine, strictly positive
    /// similarity required.
    fn select_neighbors(&self, transient: &UserRow, rows: &[UserRow]) -> Vec<(usize, f64)> {
        let transient_norm = transient.centered_norm();
        let mut similarities: Vec<(usize, f64)> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let (dot, overlap) = centered_dot_and_overlap(transient, row);
                let norm = row.centered_norm();
                let cosine = if transient_norm == 0.0 || norm == 0.0 {
                    0.0
                } else {
                    dot / (transient_norm * norm)
                };
                (i, shrink(cosine, overlap, self.config.shrinkage))
            })
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();

        similarities.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        similarities.truncate(self.config.neighbor_count);
        similarities
    }

    /// Unrated items, intersected with the genre/decade preference filters
    /// when supplied. Items absent from the catalog are only predictable
    /// when no filter is active.
    fn prediction_targets(
        &self,
        transient: &UserRow,
        items: &IdIndex,
        prefs: &Preferences,
    ) -> Vec<usize> {
        let filter_active = prefs.has_genres() || prefs.has_decades();
        let passes = |item: i64| -> bool {
            if !filter_active {
                return true;
            }
            match self.catalog.get(item) {
                Some(movie) => {
                    prefs.allows_year(movie.release_year) && prefs.matches_any_genre(movie)
                }
                None => false,
            }
        };

        (0..items.len())
            .filter(|&idx| transient.rating_of(idx).is_none())
            .filter(|&idx| passes(items.id_at(idx)))
            .collect()
    }
}

/// Applies the shrinkage factor n/(n+λ) to a similarity estimate
fn shrink(similarity: f64, overlap: usize, lambda: f64) -> f64 {
    similarity * overlap as f64 / (overlap as f64 + lambda)
}

/// Dot product of two mean-centered sparse rows over their co-rated items,
/// plus the raw overlap count
fn centered_dot_and_overlap(a: &UserRow, b: &UserRow) -> (f64, usize) {
    let mut dot = 0.0;
    let mut overlap = 0;
    let (mut i, mut j) = (0, 0);
    while i < a.entries.len() && j < b.entries.len() {
        match a.entries[i].0.cmp(&b.entries[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += (a.entries[i].1 - a.mean) * (b.entries[j].1 - b.mean);
                overlap += 1;
                i += 1;
                j += 1;
            }
        }
    }
    (dot, overlap)
}
