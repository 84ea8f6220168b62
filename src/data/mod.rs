mod catalog;
mod ratings;

pub use catalog::Catalog;
pub use ratings::RatingsTable;

/// Errors loading the external catalog / ratings assets.
///
/// These are fatal: the service cannot start (or a request cannot be
/// served) without its read-only stores.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("data file not found: {0}")]
    Missing(String),

    #[error("failed to read data file: {0}")]
    Parse(#[from] csv::Error),
}
