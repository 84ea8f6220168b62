use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches the `(YYYY)` release-year parenthetical embedded in catalog titles.
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").expect("valid regex"));

/// A movie from the catalog store with parsed metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    /// External catalog id
    pub id: i64,
    /// Title as stored, usually ending in a `(YYYY)` parenthetical
    pub title: String,
    /// Genre tags, split from the pipe-delimited catalog column
    pub genres: Vec<String>,
    /// Release year parsed from the title; None when no parenthetical is found
    pub release_year: Option<i32>,
    /// Optional popularity metadata
    pub popularity: Option<f64>,
}

impl Movie {
    /// Builds a movie from raw catalog fields, parsing the release year
    /// out of the title and splitting the genre column.
    pub fn new(id: i64, title: String, genres: &str, popularity: Option<f64>) -> Self {
        let release_year = parse_release_year(&title);
        let genres = genres
            .split('|')
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            id,
            title,
            genres,
            release_year,
            popularity,
        }
    }

    /// Whether this movie carries the given genre tag
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }

    /// Whether this movie carries every one of the given genre tags
    pub fn has_all_genres(&self, genres: &[String]) -> bool {
        genres.iter().all(|g| self.has_genre(g))
    }

    /// Release year floored to the nearest multiple of 10
    pub fn decade_bucket(&self) -> Option<i32> {
        self.release_year.map(|y| y / 10 * 10)
    }
}

/// Extracts the first 4-digit parenthetical from a title, e.g.
/// `"Toy Story (1995)"` → `Some(1995)`.
pub fn parse_release_year(title: &str) -> Option<i32> {
    YEAR_RE
        .captures(title)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
