use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::data::{Catalog, RatingsTable};
use crate::error::{AppError, AppResult};
use crate::models::{rank_descending, Preferences, Recommendations};
use crate::ncf::NcfModel;

use super::diversity::Diversifier;
use super::neighbors::{NeighborConfig, SparseNeighborCf};
use super::retrieval::{CandidateRetriever, RetrievalConfig};
use super::scoring::BatchScorer;
use super::synthesis::{EmbeddingSynthesizer, SynthesisStrategy};

/// End-to-end tuning for the recommendation pipeline.
///
/// Everything that differed between the two historical pipeline variants
/// lives here instead of being baked into code paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisStrategy,
    /// Similar users averaged by the similar-user synthesis strategy
    pub similar_user_count: usize,
    /// Candidates scored per batch; bounds peak memory, not concurrency
    pub batch_size: usize,
    /// Final list length per path
    pub top_k: usize,
    /// How many ranked NCF predictions are handed to the diversifier
    pub rerank_pool: usize,
    pub diversity_weight: f64,
    pub neighbors: NeighborConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            synthesis: SynthesisStrategy::RatedItems,
            similar_user_count: 5,
            batch_size: 100,
            top_k: 10,
            rerank_pool: 50,
            diversity_weight: 0.5,
            neighbors: NeighborConfig::default(),
        }
    }
}

/// A recommendation request after HTTP decoding.
///
/// Either `user_id` or `ratings` must be present; an explicitly empty
/// ratings map is accepted at the boundary and fails later in synthesis
/// with a typed error.
#[derive(Debug, Clone, Default)]
pub struct RecommendationRequest {
    pub user_id: Option<i64>,
    pub ratings: Option<HashMap<i64, f64>>,
    pub preferences: Preferences,
    /// Overrides the request-derived sampling seed, for reproducibility
    pub seed: Option<u64>,
}

/// Orchestrates both recommendation paths over the loaded stores and the
/// frozen model. All per-request state (candidate pool, embeddings, sparse
/// matrix, predictions) is created fresh per call and discarded with it.
pub struct RecommendationPipeline {
    catalog: Catalog,
    ratings: RatingsTable,
    model: NcfModel,
    config: PipelineConfig,
}

impl RecommendationPipeline {
    pub fn new(
        catalog: Catalog,
        ratings: RatingsTable,
        model: NcfModel,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            ratings,
            model,
            config,
        }
    }

    /// Runs retrieval → synthesis → batch scoring → diversification and,
    /// independently, the neighbor CF engine, then composes both lists.
    pub fn recommend(&self, request: &RecommendationRequest) -> AppResult<Recommendations> {
        let user_ratings = self.resolve_ratings(request)?;
        let prefs = &request.preferences;
        let seed = request
            .seed
            .unwrap_or_else(|| derive_seed(request.user_id, &prefs.genres));

        let retriever = CandidateRetriever::new(&self.catalog, self.config.retrieval.clone());
        let candidates = retriever.retrieve(prefs, seed);
        tracing::info!(candidates = candidates.len(), "retrieval phase complete");

        let ncf_recommendations = if candidates.is_empty() {
            tracing::info!("candidate pool is empty; NCF path short-circuits");
            Vec::new()
        } else {
            let synthesizer = EmbeddingSynthesizer::new(&self.model, &self.ratings);
            let embedding = synthesizer.synthesize(
                &user_ratings,
                self.config.synthesis,
                self.config.similar_user_count,
            )?;

            let scorer = BatchScorer::new(&self.model, self.config.batch_size);
            let predictions = scorer.predictions(&embedding, &candidates);
            let ranked = rank_descending(predictions, self.config.rerank_pool);

            Diversifier::new(&self.catalog).diversify(
                &ranked,
                prefs,
                self.config.diversity_weight,
                self.config.top_k,
            )
        };

        // The CF path degrades to empty instead of failing the response.
        let engine =
            SparseNeighborCf::new(&self.catalog, &self.ratings, self.config.neighbors.clone());
        let cf_recommendations = match engine.recommend(&user_ratings, prefs) {
            Ok(predictions) => predictions,
            Err(err) => {
                tracing::error!(error = %err, "neighbor CF path failed; returning an empty list");
                Vec::new()
            }
        };

        tracing::info!(
            ncf = ncf_recommendations.len(),
            cf = cf_recommendations.len(),
            "recommendation paths composed"
        );
        Ok(Recommendations {
            ncf_recommendations,
            cf_recommendations,
        })
    }

    /// The transient user's ratings: taken from the request, or looked up
    /// from the ratings store when only a user id is supplied.
    fn resolve_ratings(&self, request: &RecommendationRequest) -> AppResult<HashMap<i64, f64>> {
        if let Some(ratings) = &request.ratings {
            for (&item, &rating) in ratings {
                if !(1.0..=5.0).contains(&rating) {
                    return Err(AppError::InvalidInput(format!(
                        "rating {rating} for item {item} is outside [1,5]"
                    )));
                }
            }
            return Ok(ratings.clone());
        }

        match request.user_id {
            Some(user_id) => {
                let history = self.ratings.ratings_of(user_id);
                if history.is_empty() {
                    Err(AppError::NotFound(format!(
                        "user {user_id} has no rating history"
                    )))
                } else {
                    Ok(history)
                }
            }
            None => Err(AppError::InvalidInput(
                "either user_id or ratings must be provided".to_string(),
            )),
        }
    }
}

/// Seed derived from request content so repeated identical requests sample
/// identically without any global randomness.
fn derive_seed(user_id: Option<i64>, genres: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    genres.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Movie, Rating};
    use crate::ncf::{DenseLayer, ModelAsset};

    /// Catalog of 1990 comedies (1..=20) and 1995 dramas (21..=30)
    fn test_catalog() -> Catalog {
        let mut movies = Vec::new();
        for i in 1..=20 {
            movies.push(Movie::new(i, format!("Comedy {i} (1990)"), "Comedy", None));
        }
        for i in 21..=30 {
            movies.push(Movie::new(i, format!("Drama {i} (1995)"), "Drama", None));
        }
        Catalog::from_movies(movies)
    }

    fn test_ratings() -> RatingsTable {
        let mut rows = Vec::new();
        // Three historical users covering every catalog item.
        for i in 1..=30 {
            rows.push(Rating::new(100, i, if i % 2 == 0 { 2.0 } else { 5.0 }));
            rows.push(Rating::new(101, i, if i % 3 == 0 { 4.0 } else { 3.0 }));
            rows.push(Rating::new(102, i, if i % 5 == 0 { 1.0 } else { 4.0 }));
        }
        RatingsTable::from_rows(rows)
    }

    fn test_model() -> NcfModel {
        let embed = |i: usize, scale: f64| -> Vec<f64> {
            vec![(i as f64) / 30.0 * scale, 1.0 - (i as f64) / 30.0]
        };
        NcfModel::from_asset(ModelAsset {
            n_factors: 2,
            mlp_embed_dim: 2,
            user_ids: vec![100, 101, 102],
            item_ids: (1..=30).collect(),
            gmf_user_embeddings: (0..3).map(|i| embed(i, 1.0)).collect(),
            gmf_item_embeddings: (0..30).map(|i| embed(i, 1.0)).collect(),
            mlp_user_embeddings: (0..3).map(|i| embed(i, 0.5)).collect(),
            mlp_item_embeddings: (0..30).map(|i| embed(i, 0.5)).collect(),
            hidden_layers: vec![
                DenseLayer {
                    weights: vec![vec![0.2, 0.1]; 4],
                    biases: vec![0.05, 0.05],
                },
                DenseLayer {
                    weights: vec![vec![0.3, 0.2]; 2],
                    biases: vec![0.0, 0.1],
                },
            ],
            output_weights: vec![0.4, 0.3, 0.2, 0.1],
        })
        .unwrap()
    }

    fn pipeline() -> RecommendationPipeline {
        let config = PipelineConfig {
            retrieval: RetrievalConfig {
                pool_size: 25,
                ..RetrievalConfig::default()
            },
            top_k: 5,
            rerank_pool: 15,
            ..PipelineConfig::default()
        };
        RecommendationPipeline::new(test_catalog(), test_ratings(), test_model(), config)
    }

    fn ratings_map(entries: &[(i64, f64)]) -> HashMap<i64, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_cold_start_produces_both_paths() {
        let request = RecommendationRequest {
            ratings: Some(ratings_map(&[(1, 5.0), (2, 4.0)])),
            ..Default::default()
        };
        let result = pipeline().recommend(&request).unwrap();

        assert!(!result.ncf_recommendations.is_empty());
        assert!(result.ncf_recommendations.len() <= 5);
        for p in &result.ncf_recommendations {
            assert!(p.prediction > 0.0 && p.prediction < 1.0);
        }

        assert!(!result.cf_recommendations.is_empty());
        for p in &result.cf_recommendations {
            assert!(p.prediction >= 1.0 && p.prediction <= 5.0);
        }
    }

    #[test]
    fn test_decade_preference_constrains_ncf_pool() {
        let catalog = test_catalog();
        let request = RecommendationRequest {
            ratings: Some(ratings_map(&[(1, 5.0), (2, 4.0)])),
            preferences: Preferences {
                genres: vec!["Comedy".to_string()],
                decades: vec![1990],
            },
            ..Default::default()
        };
        let result = pipeline().recommend(&request).unwrap();

        assert!(!result.ncf_recommendations.is_empty());
        for p in &result.ncf_recommendations {
            let movie = catalog.get(p.item_id).unwrap();
            assert_eq!(movie.release_year, Some(1990));
        }
        for p in &result.cf_recommendations {
            let movie = catalog.get(p.item_id).unwrap();
            assert_eq!(movie.release_year, Some(1990));
            assert!(movie.has_genre("Comedy"));
        }
    }

    #[test]
    fn test_empty_ratings_map_surfaces_synthesis_error() {
        let request = RecommendationRequest {
            ratings: Some(HashMap::new()),
            ..Default::default()
        };
        let err = pipeline().recommend(&request).unwrap_err();
        assert!(matches!(err, AppError::Synthesis(_)));
    }

    #[test]
    fn test_missing_user_and_ratings_is_input_error() {
        let err = pipeline()
            .recommend(&RecommendationRequest::default())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_out_of_scale_rating_is_input_error() {
        let request = RecommendationRequest {
            ratings: Some(ratings_map(&[(1, 7.0)])),
            ..Default::default()
        };
        let err = pipeline().recommend(&request).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_user_id_is_not_found() {
        let request = RecommendationRequest {
            user_id: Some(9999),
            ..Default::default()
        };
        let err = pipeline().recommend(&request).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_user_id_resolves_history() {
        let request = RecommendationRequest {
            user_id: Some(100),
            ..Default::default()
        };
        let result = pipeline().recommend(&request).unwrap();
        assert!(!result.ncf_recommendations.is_empty());
    }

    #[test]
    fn test_identical_requests_are_reproducible() {
        let request = RecommendationRequest {
            ratings: Some(ratings_map(&[(1, 5.0), (2, 4.0)])),
            preferences: Preferences {
                genres: vec!["Comedy".to_string()],
                decades: vec![],
            },
            seed: Some(17),
            ..Default::default()
        };
        let pipeline = pipeline();
        assert_eq!(
            pipeline.recommend(&request).unwrap(),
            pipeline.recommend(&request).unwrap()
        );
    }

    #[test]
    fn test_similar_user_strategy_end_to_end() {
        let config = PipelineConfig {
            synthesis: SynthesisStrategy::SimilarUsers,
            top_k: 5,
            ..PipelineConfig::default()
        };
        let pipeline =
            RecommendationPipeline::new(test_catalog(), test_ratings(), test_model(), config);
        let request = RecommendationRequest {
            ratings: Some(ratings_map(&[(2, 5.0), (4, 5.0), (3, 2.0)])),
            ..Default::default()
        };
        let result = pipeline.recommend(&request).unwrap();
        assert!(!result.ncf_recommendations.is_empty());
    }
}
