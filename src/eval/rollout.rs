//! Monte-Carlo random-completion node evaluation.
//!
//! Estimates the cost of an incomplete search node by repeatedly sampling
//! randomized completions down to a goal, scoring each completed path with
//! the domain's solution evaluator, and keeping the best rollout. Results
//! are memoized per path, and completions of structurally subsuming
//! prefixes are reused instead of resampled.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::error::SearchError;
use crate::eval::cache::PathCache;
use crate::eval::uncertainty::{UncertaintySource, VarianceUncertainty};
use crate::eval::{EvalContext, EvalError, Evaluation, NodeEvaluator, SolutionError,
    SolutionEvaluator};
use crate::graph::GraphGenerator;
use crate::search::completer;

/// Retry attempts allowed per requested sample, absorbing occasional
/// rollout failures without aborting the whole evaluation.
const RETRY_FACTOR: u32 = 20;

/// A `NodeEvaluator` that estimates f-values via randomized rollouts.
pub struct RandomCompletionEvaluator<G: GraphGenerator, S> {
    generator: Arc<G>,
    solution_evaluator: S,
    uncertainty_source: Box<dyn UncertaintySource<G::Point>>,
    cache: Arc<PathCache<G::Point>>,
    solution_listener: Option<Box<dyn Fn(&[G::Point], f64) + Send + Sync>>,
    samples: u32,
    seed: u64,
}

impl<G, S> RandomCompletionEvaluator<G, S>
where
    G: GraphGenerator,
    S: SolutionEvaluator<G::Point>,
{
    /// Creates an evaluator drawing up to `samples` rollouts per node,
    /// seeded deterministically from `seed`.
    pub fn new(
        generator: Arc<G>,
        solution_evaluator: S,
        samples: u32,
        seed: u64,
    ) -> Result<Self, SearchError> {
        if samples == 0 {
            return Err(SearchError::InvalidConfig(
                "rollout sample count must be greater than 0".to_string(),
            ));
        }
        Ok(RandomCompletionEvaluator {
            generator,
            solution_evaluator,
            uncertainty_source: Box::new(VarianceUncertainty),
            cache: Arc::new(PathCache::new()),
            solution_listener: None,
            samples,
            seed,
        })
    }

    /// Registers a callback invoked once per goal path, on its first
    /// successful scoring. Rollout-discovered solutions surface here long
    /// before (or without) their node being popped.
    pub fn with_solution_listener(
        mut self,
        listener: Box<dyn Fn(&[G::Point], f64) + Send + Sync>,
    ) -> Self {
        self.solution_listener = Some(listener);
        self
    }

    /// Replaces the dispersion estimator.
    pub fn with_uncertainty_source(
        mut self,
        source: Box<dyn UncertaintySource<G::Point>>,
    ) -> Self {
        self.uncertainty_source = source;
        self
    }

    /// Shares an externally constructed cache, e.g. across evaluator
    /// instances of one run.
    pub fn with_cache(mut self, cache: Arc<PathCache<G::Point>>) -> Self {
        self.cache = cache;
        self
    }

    /// The run's path cache.
    pub fn cache(&self) -> &Arc<PathCache<G::Point>> {
        &self.cache
    }

    /// Deterministic per-rollout rng: the base seed mixed with the path
    /// hash and the attempt counter, so equal paths replay identically
    /// under a fixed seed regardless of evaluation order.
    fn rollout_rng(&self, path: &[G::Point], attempt: u32) -> SmallRng {
        let mut hasher = DefaultHasher::new();
        for point in path {
            point.hash(&mut hasher);
        }
        let mix = (attempt as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        SmallRng::seed_from_u64(self.seed ^ hasher.finish() ^ mix)
    }

    /// Scores a goal-terminated path, at most once. Failed paths are
    /// blacklisted and short-circuit on every later request without
    /// re-invoking the domain evaluator.
    fn score_of_goal_path(&self, path: &[G::Point]) -> Result<f64, EvalError> {
        if let Some(score) = self.cache.score(path) {
            return Ok(score);
        }
        // Serialize scoring per goal path: a concurrent rollout reaching
        // the same solution blocks here, then hits the cache or the
        // blacklist instead of re-invoking the domain evaluator.
        let lock = self.cache.score_lock(path);
        let _guard = lock.lock().unwrap();
        if let Some(score) = self.cache.score(path) {
            return Ok(score);
        }
        if self.cache.is_failed(path) {
            return Err(EvalError::EvaluationFailed(
                "path is blacklisted after an earlier failure".to_string(),
            ));
        }
        match self.solution_evaluator.evaluate(path) {
            Ok(score) => {
                self.cache.store_score(path, score);
                if let Some(listener) = &self.solution_listener {
                    listener(path, score);
                }
                Ok(score)
            }
            Err(SolutionError::Domain(cause)) => {
                self.cache.mark_failed(path);
                Err(EvalError::EvaluationFailed(cause))
            }
            Err(SolutionError::Cancelled) => Err(EvalError::Cancelled),
        }
    }

    fn evaluate_goal_node(&self, path: &[G::Point]) -> Result<Evaluation, EvalError> {
        // Goal nodes are scored exactly, not sampled.
        let score = self.score_of_goal_path(path)?;
        let evaluation = Evaluation::exact(score);
        self.cache.store_f_value(path, evaluation);
        Ok(evaluation)
    }

    fn evaluate_inner_node(
        &self,
        path: &[G::Point],
        ctx: &EvalContext,
    ) -> Result<Evaluation, EvalError> {
        // A known completion is reused verbatim, no resampling.
        if let Some(completion) = self.cache.completion(path) {
            let score = self.score_of_goal_path(&completion)?;
            let uncertainty =
                self.uncertainty_source
                    .uncertainty(path, Some(&completion), &[score]);
            let evaluation = Evaluation {
                cost: score,
                uncertainty,
                samples: 0,
            };
            self.cache.store_f_value(path, evaluation);
            return Ok(evaluation);
        }

        // If the last edge cannot affect any completion's score, the
        // parent's f-value carries over without sampling.
        if path.len() > 1 && !self.solution_evaluator.last_edge_affects_score(path) {
            if let Some(parent) = self.cache.f_value(&path[..path.len() - 1]) {
                self.cache.store_f_value(path, parent);
                return Ok(parent);
            }
        }

        let max_attempts = self.samples.saturating_mul(RETRY_FACTOR);
        let mut attempts = 0u32;
        let mut successes = 0u32;
        let mut sample_scores: Vec<f64> = Vec::with_capacity(self.samples as usize);
        let mut best: Option<(f64, Vec<G::Point>)> = None;
        let mut interruption: Option<EvalError> = None;

        while successes < self.samples && attempts < max_attempts {
            if let Err(e) = ctx.check() {
                interruption = Some(e);
                break;
            }
            attempts += 1;

            let mut rng = self.rollout_rng(path, attempts);
            let completion =
                match completer::complete(self.generator.as_ref(), path, &mut rng, ctx) {
                    Ok(Some(completion)) => completion,
                    Ok(None) => continue,
                    Err(e) => {
                        interruption = Some(e);
                        break;
                    }
                };

            match self.score_of_goal_path(&completion) {
                Ok(score) => {
                    successes += 1;
                    sample_scores.push(score);
                    // Best-of-N reduction; with per-sample uncertainty
                    // identical this is the Euclidean-norm order on costs.
                    if best.as_ref().is_none_or(|(b, _)| score < *b) {
                        best = Some((score, completion));
                    }
                }
                // Failed scoring burns a retry attempt, not a sample slot.
                Err(EvalError::EvaluationFailed(_)) => continue,
                Err(e) => {
                    interruption = Some(e);
                    break;
                }
            }
        }

        // An interrupt aborts the loop but a degraded result with at least
        // one successful rollout is still valid; zero successes surface as
        // "no value" so the core can deprioritize instead of crash.
        let (mut best_score, mut best_completion) = match best {
            Some(found) => found,
            None => return Err(interruption.unwrap_or(EvalError::SamplingExhausted)),
        };

        // Prefer an already-scored completion of a subsuming prefix when it
        // beats everything we sampled.
        if let Some((completion, score)) = self
            .cache
            .best_subsuming(path, |partial, complete| {
                self.generator.path_subsumed(partial, complete)
            })
        {
            if score < best_score {
                best_score = score;
                best_completion = completion;
            }
        }

        self.cache.store_completion(path, best_completion.clone());
        let uncertainty =
            self.uncertainty_source
                .uncertainty(path, Some(&best_completion), &sample_scores);
        let evaluation = Evaluation {
            cost: best_score,
            uncertainty,
            samples: successes,
        };
        self.cache.store_f_value(path, evaluation);
        Ok(evaluation)
    }
}

impl<G, S> NodeEvaluator<G::Point> for RandomCompletionEvaluator<G, S>
where
    G: GraphGenerator,
    S: SolutionEvaluator<G::Point>,
{
    fn f(
        &self,
        path: &[G::Point],
        is_goal: bool,
        ctx: &EvalContext,
    ) -> Result<Evaluation, EvalError> {
        if let Some(evaluation) = self.cache.f_value(path) {
            return Ok(evaluation);
        }
        // Single-flight per path: a second concurrent caller for an equal
        // path blocks for the episode and is served from the cache.
        let lock = self.cache.f_lock(path);
        let _guard = lock.lock().unwrap();
        if let Some(evaluation) = self.cache.f_value(path) {
            return Ok(evaluation);
        }
        if is_goal {
            self.evaluate_goal_node(path)
        } else {
            self.evaluate_inner_node(path, ctx)
        }
    }
}
