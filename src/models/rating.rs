use serde::{Deserialize, Serialize};

/// One historical user-item-rating observation from the ratings store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "itemID")]
    pub item_id: i64,
    pub rating: f64,
}

impl Rating {
    pub fn new(user_id: i64, item_id: i64, rating: f64) -> Self {
        Self {
            user_id,
            item_id,
            rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_column_names() {
        let rating = Rating::new(7, 42, 4.5);
        let json = serde_json::to_string(&rating).unwrap();
        assert_eq!(json, r#"{"userID":7,"itemID":42,"rating":4.5}"#);

        let parsed: Rating = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rating);
    }
}
