use serde::{Deserialize, Serialize};

/// A scored recommendation for one item.
///
/// NCF-path predictions are sigmoid outputs in (0,1); CF-path predictions
/// are ratings clamped to [1,5]. Scores are only ever ranked within their
/// own path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    #[serde(rename = "itemID")]
    pub item_id: i64,
    pub prediction: f64,
}

impl Prediction {
    pub fn new(item_id: i64, prediction: f64) -> Self {
        Self {
            item_id,
            prediction,
        }
    }
}

/// The composed result: both recommendation paths surfaced independently,
/// with no cross-path deduplication or re-ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recommendations {
    pub ncf_recommendations: Vec<Prediction>,
    pub cf_recommendations: Vec<Prediction>,
}

/// Sorts predictions by score descending and keeps the top `k`
pub fn rank_descending(mut predictions: Vec<Prediction>, k: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| {
        b.prediction
            .partial_cmp(&a.prediction)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    predictions.truncate(k);
    predictions
}
