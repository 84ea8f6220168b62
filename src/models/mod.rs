mod movie;
mod preferences;
mod rating;
mod recommendation;

pub use movie::{parse_release_year, Movie};
pub use preferences::Preferences;
pub use rating::Rating;
pub use recommendation::{rank_descending, Prediction, Recommendations};
