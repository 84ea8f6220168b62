use serde::{Deserialize, Serialize};

use super::Movie;

/// Stated taste preferences accompanying a recommendation request.
///
/// Empty lists mean "no preference": no filtering or biasing is applied
/// for that dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    /// Preferred genre tags
    pub genres: Vec<String>,
    /// Preferred release years (each entry matched exactly against the
    /// year parsed from the title)
    pub decades: Vec<i32>,
}

impl Preferences {
    pub fn has_genres(&self) -> bool {
        !self.genres.is_empty()
    }

    pub fn has_decades(&self) -> bool {
        !self.decades.is_empty()
    }

    /// Whether a parsed release year passes the decade filter. Items with
    /// no parseable year are excluded from decade-filtered results.
    pub fn allows_year(&self, year: Option<i32>) -> bool {
        if !self.has_decades() {
            return true;
        }
        match year {
            Some(y) => self.decades.contains(&y),
            None => false,
        }
    }

    /// Whether a movie matches at least one preferred genre. With no genre
    /// preference every movie matches.
    pub fn matches_any_genre(&self, movie: &Movie) -> bool {
        if !self.has_genres() {
            return true;
        }
        self.genres.iter().any(|g| movie.has_genre(g))
    }
}
