pub mod diversity;
pub mod neighbors;
pub mod pipeline;
pub mod retrieval;
pub mod scoring;
pub mod synthesis;

pub use pipeline::{PipelineConfig, RecommendationPipeline, RecommendationRequest};
