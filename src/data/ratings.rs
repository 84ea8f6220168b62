use std::collections::HashMap;
use std::path::Path;

use crate::models::Rating;

use super::StoreError;

/// Read-only table of historical user-item-rating triples
pub struct RatingsTable {
    rows: Vec<Rating>,
}

impl RatingsTable {
    /// Loads the ratings table from a CSV file with columns
    /// `userID,itemID,rating`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::Missing(path.display().to_string()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }

        tracing::info!(ratings = rows.len(), path = %path.display(), "ratings loaded");
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<Rating>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Rating] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest user id present in the table
    pub fn max_user_id(&self) -> Option<i64> {
        self.rows.iter().map(|r| r.user_id).max()
    }

    /// All ratings of one user as an item → rating map
    pub fn ratings_of(&self, user_id: i64) -> HashMap<i64, f64> {
        self.rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| (r.item_id, r.rating))
            .collect()
    }

    /// Ratings grouped per user, preserving first-appearance user order
    pub fn by_user(&self) -> Vec<(i64, Vec<(i64, f64)>)> {
        let mut order = Vec::new();
        let mut grouped: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
        for r in &self.rows {
            let entry = grouped.entry(r.user_id).or_insert_with(|| {
                order.push(r.user_id);
                Vec::new()
            });
            entry.push((r.item_id, r.rating));
        }
        order
            .into_iter()
            .map(|uid| {
                let items = grouped.remove(&uid).unwrap_or_default();
                (uid, items)
            })
            .collect()
    }
}
