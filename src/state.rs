use std::sync::Arc;

use crate::config::Config;
use crate::data::{Catalog, RatingsTable};
use crate::ncf::NcfModel;
use crate::services::{PipelineConfig, RecommendationPipeline};

/// Shared application state.
///
/// The stores and the frozen model are loaded once at startup and never
/// mutated afterwards, so handlers share them through a plain `Arc` with
/// no locking.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RecommendationPipeline>,
}

impl AppState {
    pub fn new(pipeline: RecommendationPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Loads every external asset named by the configuration. A missing or
    /// corrupt asset is fatal here — the service refuses to start.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalog = Catalog::load(&config.catalog_path)?;
        let ratings = RatingsTable::load(&config.ratings_path)?;
        let model = NcfModel::load(&config.model_path)?;
        Ok(Self::new(RecommendationPipeline::new(
            catalog,
            ratings,
            model,
            PipelineConfig::default(),
        )))
    }

    pub fn pipeline(&self) -> &RecommendationPipeline {
        &self.pipeline
    }
}
