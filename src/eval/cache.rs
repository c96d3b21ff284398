//! Path-keyed evaluation caches.
//!
//! One cache object is constructed per search run and shared by reference
//! with the evaluator layer; it is dropped at run end. Keys are full
//! root-to-node paths, so two structurally equal paths always hit the same
//! entry regardless of node identity. Every map is guarded by its own
//! mapping-level lock, and per-path guards serialize evaluation episodes
//! and scoring, so concurrent evaluators never duplicate work for equal
//! paths: the second caller blocks and reuses the first caller's result.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::eval::Evaluation;

/// Completion, score, f-value, and blacklist caches for one search run.
pub struct PathCache<T> {
    /// Partial path -> best known goal-terminated completion. Entries are
    /// written once and never overwritten.
    completions: Mutex<HashMap<Vec<T>, Vec<T>>>,
    /// Goal-terminated path -> score. A path is scored at most once.
    scores: Mutex<HashMap<Vec<T>, f64>>,
    /// Paths whose domain evaluation failed; never retried.
    failed: Mutex<HashSet<Vec<T>>>,
    /// Partial path -> memoized f-value.
    f_values: Mutex<HashMap<Vec<T>, Evaluation>>,
    /// Per-path guards serializing whole evaluation episodes: the second
    /// concurrent caller for an equal path blocks, then reuses the
    /// memoized f-value instead of sampling again.
    f_locks: Mutex<HashMap<Vec<T>, Arc<Mutex<()>>>>,
    /// Per-path guards serializing goal-path scoring. Kept separate from
    /// `f_locks` so a goal node's evaluation, which holds its f-guard,
    /// can take the score guard for the same path.
    score_locks: Mutex<HashMap<Vec<T>, Arc<Mutex<()>>>>,
}

impl<T: Clone + Eq + Hash> PathCache<T> {
    pub fn new() -> Self {
        PathCache {
            completions: Mutex::new(HashMap::new()),
            scores: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
            f_values: Mutex::new(HashMap::new()),
            f_locks: Mutex::new(HashMap::new()),
            score_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The guard serializing f-value computation for a path. Callers hold
    /// it across the whole evaluation episode and re-check the memoized
    /// f-value once inside.
    pub fn f_lock(&self, path: &[T]) -> Arc<Mutex<()>> {
        Arc::clone(
            self.f_locks
                .lock()
                .unwrap()
                .entry(path.to_vec())
                .or_default(),
        )
    }

    /// The guard serializing domain scoring of a goal path.
    pub fn score_lock(&self, path: &[T]) -> Arc<Mutex<()>> {
        Arc::clone(
            self.score_locks
                .lock()
                .unwrap()
                .entry(path.to_vec())
                .or_default(),
        )
    }

    /// The cached completion for a path, if one was ever stored.
    pub fn completion(&self, path: &[T]) -> Option<Vec<T>> {
        self.completions.lock().unwrap().get(path).cloned()
    }

    /// Stores a goal-terminated completion for a path. Idempotent: an
    /// existing entry wins, so repeated calls always observe the same
    /// completion.
    pub fn store_completion(&self, path: &[T], completion: Vec<T>) {
        self.completions
            .lock()
            .unwrap()
            .entry(path.to_vec())
            .or_insert(completion);
    }

    pub fn score(&self, path: &[T]) -> Option<f64> {
        self.scores.lock().unwrap().get(path).copied()
    }

    pub fn store_score(&self, path: &[T], score: f64) {
        self.scores
            .lock()
            .unwrap()
            .entry(path.to_vec())
            .or_insert(score);
    }

    pub fn is_failed(&self, path: &[T]) -> bool {
        self.failed.lock().unwrap().contains(path)
    }

    pub fn mark_failed(&self, path: &[T]) {
        self.failed.lock().unwrap().insert(path.to_vec());
    }

    pub fn f_value(&self, path: &[T]) -> Option<Evaluation> {
        self.f_values.lock().unwrap().get(path).copied()
    }

    pub fn store_f_value(&self, path: &[T], evaluation: Evaluation) {
        self.f_values
            .lock()
            .unwrap()
            .insert(path.to_vec(), evaluation);
    }

    /// The best-scored known completion that subsumes `path` (shares it as
    /// a prefix per `subsumes`) and is already goal-scored.
    pub fn best_subsuming<F>(&self, path: &[T], subsumes: F) -> Option<(Vec<T>, f64)>
    where
        F: Fn(&[T], &[T]) -> bool,
    {
        let candidates: Vec<Vec<T>> = {
            let completions = self.completions.lock().unwrap();
            completions
                .values()
                .filter(|completion| subsumes(path, completion))
                .cloned()
                .collect()
        };

        let scores = self.scores.lock().unwrap();
        candidates
            .into_iter()
            .filter_map(|completion| {
                let score = *scores.get(&completion)?;
                Some((completion, score))
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
    }

    /// Number of scored solution paths, reported as a solution annotation.
    pub fn scored_paths(&self) -> usize {
        self.scores.lock().unwrap().len()
    }
}

impl<T: Clone + Eq + Hash> Default for PathCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix_subsumes(partial: &[u32], complete: &[u32]) -> bool {
        complete.len() >= partial.len() && complete[..partial.len()] == *partial
    }

    #[test]
    fn completions_are_idempotent() {
        let cache: PathCache<u32> = PathCache::new();
        cache.store_completion(&[0, 1], vec![0, 1, 2, 3]);
        cache.store_completion(&[0, 1], vec![0, 1, 9, 9]);

        assert_eq!(cache.completion(&[0, 1]), Some(vec![0, 1, 2, 3]));
        // Repeated lookups are stable.
        assert_eq!(cache.completion(&[0, 1]), Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn scores_are_written_once() {
        let cache: PathCache<u32> = PathCache::new();
        cache.store_score(&[0, 1, 2], 5.0);
        cache.store_score(&[0, 1, 2], 9.0);
        assert_eq!(cache.score(&[0, 1, 2]), Some(5.0));
    }

    #[test]
    fn blacklist_is_sticky() {
        let cache: PathCache<u32> = PathCache::new();
        assert!(!cache.is_failed(&[0, 7]));
        cache.mark_failed(&[0, 7]);
        assert!(cache.is_failed(&[0, 7]));
    }

    #[test]
    fn best_subsuming_picks_lowest_scored_completion() {
        let cache: PathCache<u32> = PathCache::new();
        cache.store_completion(&[0], vec![0, 1, 2]);
        cache.store_score(&[0, 1, 2], 4.0);
        cache.store_completion(&[0, 3], vec![0, 3, 4]);
        cache.store_score(&[0, 3, 4], 1.0);

        let (completion, score) = cache.best_subsuming(&[0], prefix_subsumes).unwrap();
        assert_eq!(completion, vec![0, 3, 4]);
        assert_eq!(score, 1.0);

        // A prefix that matches no completion yields nothing.
        assert!(cache.best_subsuming(&[0, 9], prefix_subsumes).is_none());
    }

    #[test]
    fn unscored_completions_are_ignored_by_subsumption() {
        let cache: PathCache<u32> = PathCache::new();
        cache.store_completion(&[0], vec![0, 1, 2]);
        assert!(cache.best_subsuming(&[0], prefix_subsumes).is_none());
    }

    #[test]
    fn equal_paths_share_one_guard() {
        let cache: PathCache<u32> = PathCache::new();
        assert!(Arc::ptr_eq(&cache.f_lock(&[0, 1]), &cache.f_lock(&[0, 1])));
        assert!(!Arc::ptr_eq(&cache.f_lock(&[0, 1]), &cache.f_lock(&[0, 2])));
        // f and score guards for the same path are distinct locks.
        assert!(!Arc::ptr_eq(
            &cache.f_lock(&[0, 1]),
            &cache.score_lock(&[0, 1])
        ));
    }
}
