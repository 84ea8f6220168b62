use std::collections::HashSet;

use crate::data::Catalog;
use crate::models::{Prediction, Preferences};

/// Greedy re-ranker that trades raw prediction against genre and decade
/// novelty so one genre or era does not dominate the final list.
///
/// Selection starts from the top-scored item; every further pick maximizes
/// `(1 − w) · prediction + w · diversity`, where diversity averages genre
/// novelty (requested genres boosted, repeated non-requested genres
/// penalized) with binary decade-bucket novelty.
pub struct Diversifier<'a> {
    catalog: &'a Catalog,
}

impl<'a> Diversifier<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Re-ranks `ranked` (already sorted by prediction descending) down to
    /// `k` items. Returns the input unchanged when it is within bounds.
    pub fn diversify(
        &self,
        ranked: &[Prediction],
        prefs: &Preferences,
        diversity_weight: f64,
        k: usize,
    ) -> Vec<Prediction> {
        if ranked.len() <= k {
            return ranked.to_vec();
        }

        let mut remaining: Vec<Prediction> = ranked.to_vec();
        let mut seen_genres: HashSet<String> = HashSet::new();
        let mut covered_requested: HashSet<String> = HashSet::new();
        let mut seen_decades: HashSet<i32> = HashSet::new();

        let first = remaining.remove(0);
        self.track(
            first.item_id,
            prefs,
            &mut seen_genres,
            &mut covered_requested,
            &mut seen_decades,
        );
        let mut selected = vec![first];

        while selected.len() < k && !remaining.is_empty() {
            let mut best_index = 0;
            let mut best_score = f64::NEG_INFINITY;
            for (i, candidate) in remaining.iter().enumerate() {
                let diversity = self.diversity_score(
                    candidate.item_id,
                    prefs,
                    &seen_genres,
                    &covered_requested,
                    &seen_decades,
                );
                let combined =
                    (1.0 - diversity_weight) * candidate.prediction + diversity_weight * diversity;
                if combined > best_score {
                    best_score = combined;
                    best_index = i;
                }
            }

            let chosen = remaining.remove(best_index);
            self.track(
                chosen.item_id,
                prefs,
                &mut seen_genres,
                &mut covered_requested,
                &mut seen_decades,
            );
            selected.push(chosen);
        }

        selected
    }

    /// Average of genre novelty and decade novelty, both in [0,1]
    fn diversity_score(
        &self,
        item_id: i64,
        prefs: &Preferences,
        seen_genres: &HashSet<String>,
        covered_requested: &HashSet<String>,
        seen_decades: &HashSet<i32>,
    ) -> f64 {
        let movie = self.catalog.get(item_id);
        let genres: &[String] = movie.map(|m| m.genres.as_slice()).unwrap_or(&[]);
        let decade = movie.and_then(|m| m.decade_bucket());

        let genre_diversity = if prefs.has_genres() {
            let requested: HashSet<&str> = prefs.genres.iter().map(String::as_str).collect();
            let newly_covered = genres
                .iter()
                .filter(|g| requested.contains(g.as_str()) && !covered_requested.contains(*g))
                .count();
            let requested_overlap = genres
                .iter()
                .filter(|g| requested.contains(g.as_str()))
                .count();
            let repeated_other = genres
                .iter()
                .filter(|g| !requested.contains(g.as_str()) && seen_genres.contains(*g))
                .count();

            0.5 + newly_covered as f64 * 0.3 + requested_overlap as f64 * 0.1
                - repeated_other as f64 / genres.len().max(1) as f64 * 0.2
        } else {
            let overlap = genres.iter().filter(|g| seen_genres.contains(*g)).count();
            1.0 - overlap as f64 / genres.len().max(1) as f64
        };
        let genre_diversity = genre_diversity.clamp(0.0, 1.0);

        let decade_diversity = match decade {
            Some(d) if seen_decades.contains(&d) => 0.0,
            _ => 1.0,
        };

        (genre_diversity + decade_diversity) / 2.0
    }

    fn track(
        &self,
        item_id: i64,
        prefs: &Preferences,
        seen_genres: &mut HashSet<String>,
        covered_requested: &mut HashSet<String>,
        seen_decades: &mut HashSet<i32>,
    ) {
        let Some(movie) = self.catalog.get(item_id) else {
            return;
        };
        for genre in &movie.genres {
            seen_genres.insert(genre.clone());
            if prefs.genres.contains(genre) {
                covered_requested.insert(genre.clone());
            }
        }
        if let Some(decade) = movie.decade_bucket() {
            seen_decades.insert(decade);
        }
    }
}
