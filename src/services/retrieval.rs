use std::cmp::Ordering;
use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::Catalog;
use crate::models::{Movie, Preferences};

/// Reserved candidates are capped at this fraction of the pool size
const RESERVED_FRACTION: f64 = 0.3;

/// How genre affinity is scored during retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenreScoring {
    /// Count of requested genres present on the item
    MatchCount,
    /// Jaccard similarity of requested vs item genre sets; discriminates
    /// better between items with different genre-set sizes
    Jaccard,
}

/// Tuning for candidate retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Upper bound on pool size (k)
    pub pool_size: usize,
    /// Fraction of k reserved for zero-affinity exploration items
    pub exploration_ratio: f64,
    pub genre_scoring: GenreScoring,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pool_size: 500,
            exploration_ratio: 0.1,
            genre_scoring: GenreScoring::Jaccard,
        }
    }
}

/// Builds a bounded, preference-biased candidate pool from the catalog.
///
/// The pool is three disjoint segments appended in priority order:
/// *reserved* (guaranteed coverage of each requested genre and of
/// full-genre-set matches), *main* (affinity-ranked, shuffled within equal
/// scores) and *exploration* (zero-affinity items for serendipity). The
/// ordering is retrieval priority, not relevance — relevance ranking
/// happens downstream in the scorer.
pub struct CandidateRetriever<'a> {
    catalog: &'a Catalog,
    config: RetrievalConfig,
}

impl<'a> CandidateRetriever<'a> {
    pub fn new(catalog: &'a Catalog, config: RetrievalConfig) -> Self {
        Self { catalog, config }
    }

    /// Retrieves up to `pool_size` candidate item ids. The same seed and
    /// preferences always produce the same pool.
    pub fn retrieve(&self, prefs: &Preferences, seed: u64) -> Vec<i64> {
        let mut rng = StdRng::seed_from_u64(seed);

        let eligible: Vec<&Movie> = self
            .catalog
            .movies()
            .iter()
            .filter(|m| prefs.allows_year(m.release_year))
            .collect();

        if eligible.is_empty() {
            tracing::debug!("no catalog items remain after decade filtering");
            return Vec::new();
        }

        let k = self.config.pool_size;
        let exploration_count = (k as f64 * self.config.exploration_ratio) as usize;

        if !prefs.has_genres() {
            // Every item scores the same: one shuffled group, no reserved
            // or exploration split.
            let mut pool: Vec<i64> = eligible.iter().map(|m| m.id).collect();
            pool.shuffle(&mut rng);
            pool.truncate(k.saturating_sub(exploration_count));
            return pool;
        }

        let scored: Vec<(f64, &Movie)> = eligible
            .iter()
            .map(|m| (self.genre_score(m, prefs), *m))
            .collect();

        let reserved = self.reserve(&eligible, prefs, k, &mut rng);
        let reserved_set: HashSet<i64> = reserved.iter().copied().collect();

        let main = self.main_segment(
            &scored,
            &reserved_set,
            k.saturating_sub(exploration_count + reserved.len()),
            &mut rng,
        );

        let exploration = self.exploration_segment(&scored, exploration_count, &mut rng);

        tracing::debug!(
            reserved = reserved.len(),
            main = main.len(),
            exploration = exploration.len(),
            "candidate pool assembled"
        );

        let mut pool = reserved;
        pool.extend(main);
        pool.extend(exploration);
        pool
    }

    fn genre_score(&self, movie: &Movie, prefs: &Preferences) -> f64 {
        match self.config.genre_scoring {
            GenreScoring::MatchCount => {
                prefs.genres.iter().filter(|g| movie.has_genre(g)).count() as f64
            }
            GenreScoring::Jaccard => {
                let requested: HashSet<&str> = prefs.genres.iter().map(String::as_str).collect();
                let intersection = movie
                    .genres
                    .iter()
                    .filter(|g| requested.contains(g.as_str()))
                    .count();
                let union = requested.len() + movie.genres.len() - intersection;
                if union == 0 {
                    0.0
                } else {
                    intersection as f64 / union as f64
                }
            }
        }
    }

    /// Samples the reserved segment: full-genre-set matches first when more
    /// than one genre is requested, then a quota per requested genre, capped
    /// at `RESERVED_FRACTION` of k.
    fn reserve(
        &self,
        eligible: &[&Movie],
        prefs: &Preferences,
        k: usize,
        rng: &mut StdRng,
    ) -> Vec<i64> {
        let per_genre_quota = ((k as f64 * 0.01) as usize).max(5);
        let full_match_quota = ((k as f64 * 0.005) as usize).max(10);
        let max_reserved = (k as f64 * RESERVED_FRACTION) as usize;

        let mut reserved: Vec<i64> = Vec::new();
        let mut taken: HashSet<i64> = HashSet::new();

        if prefs.genres.len() > 1 {
            let full_matches: Vec<i64> = eligible
                .iter()
                .filter(|m| m.has_all_genres(&prefs.genres))
                .map(|m| m.id)
                .collect();
            for id in sample_ids(&full_matches, full_match_quota, rng) {
                taken.insert(id);
                reserved.push(id);
            }
        }

        for genre in &prefs.genres {
            let pool: Vec<i64> = eligible
                .iter()
                .filter(|m| m.has_genre(genre) && !taken.contains(&m.id))
                .map(|m| m.id)
                .collect();
            for id in sample_ids(&pool, per_genre_quota, rng) {
                taken.insert(id);
                reserved.push(id);
            }
        }

        reserved.truncate(max_reserved);
        reserved
    }

    /// Positive-affinity items not already reserved, grouped by score value,
    /// each group shuffled, groups concatenated high to low.
    fn main_segment(
        &self,
        scored: &[(f64, &Movie)],
        reserved: &HashSet<i64>,
        main_count: usize,
        rng: &mut StdRng,
    ) -> Vec<i64> {
        let mut matching: Vec<(f64, i64)> = scored
            .iter()
            .filter(|(score, m)| *score > 0.0 && !reserved.contains(&m.id))
            .map(|(score, m)| (*score, m.id))
            .collect();
        matching.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut main = Vec::with_capacity(matching.len());
        let mut start = 0;
        while start < matching.len() {
            let mut end = start + 1;
            while end < matching.len() && matching[end].0 == matching[start].0 {
                end += 1;
            }
            let mut group: Vec<i64> = matching[start..end].iter().map(|(_, id)| *id).collect();
            group.shuffle(rng);
            main.extend(group);
            start = end;
        }
        main.truncate(main_count);
        main
    }

    /// Zero-affinity items for serendipity, preferring popular ones when the
    /// catalog carries popularity metadata.
    fn exploration_segment(
        &self,
        scored: &[(f64, &Movie)],
        exploration_count: usize,
        rng: &mut StdRng,
    ) -> Vec<i64> {
        if exploration_count == 0 {
            return Vec::new();
        }
        let mut non_matching: Vec<&Movie> = scored
            .iter()
            .filter(|(score, _)| *score == 0.0)
            .map(|(_, m)| *m)
            .collect();
        if non_matching.is_empty() {
            return Vec::new();
        }

        if self.catalog.has_popularity() {
            non_matching.sort_by(|a, b| {
                b.popularity
                    .unwrap_or(0.0)
                    .partial_cmp(&a.popularity.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            });
            non_matching
                .iter()
                .take(exploration_count)
                .map(|m| m.id)
                .collect()
        } else {
            let ids: Vec<i64> = non_matching.iter().map(|m| m.id).collect();
            sample_ids(&ids, exploration_count, rng)
        }
    }
}

fn sample_ids(pool: &[i64], amount: usize, rng: &mut StdRng) -> Vec<i64> {
    pool.choose_multiple(rng, amount.min(pool.len()))
        .copied()
        .collect()
}
