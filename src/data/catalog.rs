use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::models::Movie;

use super::StoreError;

/// Raw catalog CSV record: `movieId,title,genres[,popularity]`
#[derive(Debug, Deserialize)]
struct MovieRow {
    #[serde(rename = "movieId")]
    movie_id: i64,
    title: String,
    genres: String,
    #[serde(default)]
    popularity: Option<f64>,
}

/// Read-only movie catalog, loaded once at startup
pub struct Catalog {
    movies: Vec<Movie>,
    by_id: HashMap<i64, usize>,
}

impl Catalog {
    /// Loads the catalog from a CSV file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::Missing(path.display().to_string()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut movies = Vec::new();
        for row in reader.deserialize() {
            let row: MovieRow = row?;
            movies.push(Movie::new(row.movie_id, row.title, &row.genres, row.popularity));
        }

        tracing::info!(movies = movies.len(), path = %path.display(), "catalog loaded");
        Ok(Self::from_movies(movies))
    }

    /// Builds a catalog from already-parsed movies
    pub fn from_movies(movies: Vec<Movie>) -> Self {
        let by_id = movies
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, i))
            .collect();
        Self { movies, by_id }
    }

    pub fn get(&self, id: i64) -> Option<&Movie> {
        self.by_id.get(&id).map(|&i| &self.movies[i])
    }

    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    /// Whether any catalog entry carries popularity metadata
    pub fn has_popularity(&self) -> bool {
        self.movies.iter().any(|m| m.popularity.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "movieId,title,genres").unwrap();
        writeln!(file, "1,Toy Story (1995),Adventure|Animation|Comedy").unwrap();
        writeln!(file, "2,\"American President, The (1995)\",Comedy|Drama|Romance").unwrap();
        writeln!(file, "3,Nixon (1995),Drama").unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(!catalog.has_popularity());

        let movie = catalog.get(2).unwrap();
        assert_eq!(movie.title, "American President, The (1995)");
        assert_eq!(movie.release_year, Some(1995));
        assert!(movie.has_genre("Romance"));
    }

    #[test]
    fn test_load_with_popularity_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "movieId,title,genres,popularity").unwrap();
        writeln!(file, "1,Heat (1995),Action|Crime,0.92").unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert!(catalog.has_popularity());
        assert_eq!(catalog.get(1).unwrap().popularity, Some(0.92));
    }

    #[test]
    fn test_missing_file() {
        let result = Catalog::load("/nonexistent/movies.csv");
        assert!(matches!(result, Err(StoreError::Missing(_))));
    }
}
