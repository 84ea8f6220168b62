use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{Preferences, Recommendations};
use crate::services::RecommendationRequest;
use crate::state::AppState;

/// Request payload for the recommendations endpoint. Either `user_id` or
/// `ratings` must be present.
#[derive(Debug, Deserialize)]
pub struct RecommendationPayload {
    pub user_id: Option<i64>,
    /// Item id → rating in [1,5]; defines the transient cold-start user
    pub ratings: Option<HashMap<i64, f64>>,
    #[serde(default)]
    pub genre_preferences: Vec<String>,
    #[serde(default)]
    pub decade_preferences: Vec<i32>,
    /// Overrides the request-derived sampling seed, for reproducibility
    pub seed: Option<u64>,
}

/// Handler for the recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Json(payload): Json<RecommendationPayload>,
) -> AppResult<Json<Recommendations>> {
    let request = RecommendationRequest {
        user_id: payload.user_id,
        ratings: payload.ratings,
        preferences: Preferences {
            genres: payload.genre_preferences,
            decades: payload.decade_preferences,
        },
        seed: payload.seed,
    };

    let recommendations = state.pipeline().recommend(&request)?;
    Ok(Json(recommendations))
}
