//! Best-first search core.
//!
//! Drives the expand-evaluate-insert loop: pop the best open candidate,
//! expand it through the generator, evaluate each child (optionally in
//! parallel on a bounded worker pool), and reinsert evaluated children
//! into the open list. Per-node failures are absorbed locally; the search
//! always terminates in one of four terminal states.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde_json::json;

use crate::config::{SearchConfig, SolutionMode};
use crate::error::SearchError;
use crate::eval::{EvalContext, EvalError, Evaluation, NodeEvaluator, UncertaintyMeasure};
use crate::events::{EventSubscriber, SearchEvent, SearchStats};
use crate::graph::{Arena, GraphGenerator, NodeId, NodeKind};
use crate::search::open_list::{OpenList, PhaseAdjuster};

/// Terminal state of a search run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// At least one solution was found.
    Succeeded,
    /// The open list ran dry without a solution.
    Exhausted,
    /// The global timeout expired.
    TimedOut,
    /// The cancellation token fired.
    Cancelled,
}

/// A goal path with its evaluated cost.
#[derive(Clone, Debug)]
pub struct Solution<T> {
    pub path: Vec<T>,
    pub cost: f64,
}

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct SearchReport<T> {
    pub termination: Termination,
    pub solutions: Vec<Solution<T>>,
    pub stats: SearchStats,
}

impl<T> SearchReport<T> {
    /// The lowest-cost solution found, if any.
    pub fn best(&self) -> Option<&Solution<T>> {
        self.solutions
            .iter()
            .min_by(|a, b| a.cost.total_cmp(&b.cost))
    }
}

/// The best-first search orchestrator.
pub struct BestFirstSearch<G: GraphGenerator, E> {
    generator: Arc<G>,
    evaluator: Arc<E>,
    config: SearchConfig,
    arena: Arena<G::Point>,
    open: OpenList<G::Point>,
    /// Not-yet-computable nodes parked for a single later pass each.
    deferred: Vec<NodeId>,
    retried: HashSet<NodeId>,
    subscribers: Vec<EventSubscriber<G::Point>>,
    /// Goal paths the evaluator scored during evaluation, drained after
    /// every batch and surfaced as `SolutionFound` events.
    solution_inbox: Option<Receiver<(Vec<G::Point>, f64)>>,
    cancel: Arc<AtomicBool>,
    pool: Option<rayon::ThreadPool>,
    stats: SearchStats,
    solutions: Vec<Solution<G::Point>>,
}

impl<G, E> BestFirstSearch<G, E>
where
    G: GraphGenerator,
    E: NodeEvaluator<G::Point>,
{
    /// Creates a search over `generator` ordered by `evaluator`.
    pub fn new(generator: Arc<G>, evaluator: Arc<E>, config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;

        let pool = if config.num_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .build()
                .map_err(|e| SearchError::InvalidConfig(format!("worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        let mut avoidance = config.avoidance.clone();
        if avoidance.timeout.is_none() {
            avoidance.timeout = config.timeout;
        }

        Ok(BestFirstSearch {
            generator,
            evaluator,
            config,
            arena: Arena::new(),
            open: OpenList::new(avoidance),
            deferred: Vec::new(),
            retried: HashSet::new(),
            subscribers: Vec::new(),
            solution_inbox: None,
            cancel: Arc::new(AtomicBool::new(false)),
            pool,
            stats: SearchStats::default(),
            solutions: Vec::new(),
        })
    }

    /// Installs the solution-distance metric for the TwoPhase diversity
    /// filter.
    pub fn with_distance_metric(
        mut self,
        metric: Box<dyn Fn(&G::Point, &G::Point) -> f64 + Send>,
    ) -> Self {
        self.open.set_distance_metric(metric);
        self
    }

    /// Replaces the adaptive phase-length rule of the TwoPhase scheduler.
    pub fn with_phase_adjuster(mut self, adjuster: Box<dyn PhaseAdjuster>) -> Self {
        self.open.set_adjuster(adjuster);
        self
    }

    /// Connects the channel on which an evaluator reports goal paths it
    /// scored while evaluating (see
    /// `RandomCompletionEvaluator::with_solution_listener`). Drained after
    /// every evaluation batch and surfaced as `SolutionFound` events;
    /// popped goals alone decide termination and the solution list.
    pub fn with_solution_inbox(mut self, inbox: Receiver<(Vec<G::Point>, f64)>) -> Self {
        self.solution_inbox = Some(inbox);
        self
    }

    /// Registers an event subscriber. Subscribers observe the search; they
    /// cannot affect its correctness.
    pub fn subscribe(&mut self, subscriber: EventSubscriber<G::Point>) {
        self.subscribers.push(subscriber);
    }

    /// Token that cancels the run cooperatively; checked between rollouts
    /// and between expansions.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn emit(&mut self, event: &SearchEvent<G::Point>) {
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }

    fn best_cost(&self) -> Option<f64> {
        self.solutions
            .iter()
            .map(|s| s.cost)
            .min_by(f64::total_cmp)
    }

    /// Runs the search to one of the four terminal states.
    pub fn run(&mut self) -> Result<SearchReport<G::Point>, SearchError> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let ctx = EvalContext::new(Arc::clone(&self.cancel), deadline);

        self.emit(&SearchEvent::AlgorithmInitialized);

        let root_point = self.generator.root();
        let root_goal = self.generator.is_goal(&root_point);
        let root = self.arena.create_root(root_point.clone(), root_goal);
        self.stats.created += 1;
        self.emit(&SearchEvent::NodeCreated {
            id: root,
            parent: None,
            kind: NodeKind::Or,
            is_goal: root_goal,
        });
        let results = self.evaluate_batch(vec![(root, vec![root_point], root_goal)], &ctx);
        self.integrate(results, false);

        let termination = loop {
            if self.cancel.load(Ordering::Relaxed) {
                self.emit(&SearchEvent::Cancelled);
                break Termination::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.emit(&SearchEvent::Timeout);
                break Termination::TimedOut;
            }

            let incumbent = self.best_cost();
            let Some((id, point, measure)) = self.open.pop(incumbent) else {
                if !self.deferred.is_empty() {
                    self.retry_deferred(&ctx);
                    continue;
                }
                break if self.solutions.is_empty() {
                    Termination::Exhausted
                } else {
                    Termination::Succeeded
                };
            };

            if self.arena.node(id).is_goal {
                let path = self.arena.path_to(id);
                self.solutions.push(Solution {
                    path: path.clone(),
                    cost: measure.cost,
                });
                self.stats.solutions += 1;
                self.open.note_solution(point);
                self.emit(&SearchEvent::SolutionFound {
                    path,
                    cost: measure.cost,
                });
                if self.config.solution_mode == SolutionMode::First {
                    break Termination::Succeeded;
                }
                continue;
            }

            self.expand_node(id, &point)?;
            let children = self.arena.node(id).children.clone();
            let batch: Vec<(NodeId, Vec<G::Point>, bool)> = children
                .into_iter()
                .map(|child| {
                    (
                        child,
                        self.arena.path_to(child),
                        self.arena.node(child).is_goal,
                    )
                })
                .collect();
            let results = self.evaluate_batch(batch, &ctx);
            self.integrate(results, false);
        };

        if matches!(termination, Termination::Succeeded | Termination::Exhausted) {
            let stats = self.stats;
            self.emit(&SearchEvent::AlgorithmFinished { stats });
        }

        Ok(SearchReport {
            termination,
            solutions: self.solutions.clone(),
            stats: self.stats,
        })
    }

    /// Expands a node through the generator and reports the new children.
    fn expand_node(&mut self, id: NodeId, point: &G::Point) -> Result<(), SearchError> {
        let successors = self.generator.successors(point);
        let described: Vec<(G::Point, String, NodeKind, bool)> = successors
            .into_iter()
            .map(|s| {
                let is_goal = self.generator.is_goal(&s.point);
                (s.point, s.edge, s.kind, is_goal)
            })
            .collect();

        let child_count = described.len() as u64;
        let (children, duplicate) = self.arena.expand(id, described)?;
        self.stats.expanded += 1;
        self.stats.created += child_count;

        if duplicate {
            self.arena.annotate(id, "duplicateChildren", json!(true));
            self.emit(&SearchEvent::NodeAnnotated {
                id,
                key: "duplicateChildren".to_string(),
                value: json!(true),
            });
        }

        for child in children {
            let (kind, is_goal) = {
                let node = self.arena.node(child);
                (node.kind, node.is_goal)
            };
            self.emit(&SearchEvent::NodeCreated {
                id: child,
                parent: Some(id),
                kind,
                is_goal,
            });
        }
        Ok(())
    }

    /// Evaluates a batch of nodes, in parallel when a worker pool is
    /// configured. Workers compute labels over cloned paths and return
    /// results; they never touch the open list.
    fn evaluate_batch(
        &self,
        batch: Vec<(NodeId, Vec<G::Point>, bool)>,
        ctx: &EvalContext,
    ) -> Vec<(NodeId, Result<Evaluation, EvalError>)> {
        let evaluator = Arc::clone(&self.evaluator);
        let per_node = self.config.per_node_eval_timeout;
        let work = move |(id, path, is_goal): &(NodeId, Vec<G::Point>, bool)| {
            let node_ctx = match per_node {
                Some(t) => ctx.with_deadline(Instant::now() + t),
                None => ctx.clone(),
            };
            (*id, evaluator.f(path, *is_goal, &node_ctx))
        };

        match &self.pool {
            Some(pool) => pool.install(|| batch.par_iter().map(&work).collect()),
            None => batch.par_iter().map(&work).collect(),
        }
    }

    /// Folds evaluation results into the open list. With `final_pass` set,
    /// not-yet-computable nodes are pruned instead of deferred again.
    fn integrate(
        &mut self,
        results: Vec<(NodeId, Result<Evaluation, EvalError>)>,
        final_pass: bool,
    ) {
        for (id, result) in results {
            match result {
                Ok(evaluation) => {
                    self.arena
                        .set_label(id, evaluation.cost, evaluation.uncertainty);
                    if evaluation.samples > 0 {
                        self.annotate_and_emit(id, "rolloutSamples", json!(evaluation.samples));
                    }
                    if evaluation.uncertainty > 0.0 {
                        self.annotate_and_emit(id, "uncertainty", json!(evaluation.uncertainty));
                    }
                    let point = self.arena.node(id).point.clone();
                    self.open.push(id, point, evaluation.measure());
                    self.stats.evaluated += 1;
                }
                Err(EvalError::NotYetComputable) => {
                    if final_pass {
                        self.annotate_and_emit(id, "fError", json!("notComputable"));
                        self.stats.pruned += 1;
                    } else {
                        self.deferred.push(id);
                        self.stats.deferred += 1;
                    }
                }
                Err(EvalError::Timeout) => match self.config.eval_fallback_cost {
                    Some(fallback) => {
                        self.arena.set_label(id, fallback, 0.0);
                        self.annotate_and_emit(id, "fError", json!("timeout"));
                        let point = self.arena.node(id).point.clone();
                        self.open.push(id, point, UncertaintyMeasure::exact(fallback));
                        self.stats.evaluated += 1;
                    }
                    None => {
                        self.annotate_and_emit(id, "fError", json!("timeout"));
                        self.stats.pruned += 1;
                    }
                },
                Err(EvalError::SamplingExhausted) => {
                    // No value, but not fatal: park at the bottom of the
                    // cost order rather than prune.
                    self.annotate_and_emit(id, "fError", json!("samplingExhausted"));
                    let point = self.arena.node(id).point.clone();
                    self.open.push(
                        id,
                        point,
                        UncertaintyMeasure {
                            cost: f64::INFINITY,
                            uncertainty: 0.0,
                        },
                    );
                    self.stats.evaluated += 1;
                }
                Err(EvalError::Cancelled) => {
                    // The main loop observes the token and terminates; the
                    // node was abandoned, not pruned.
                }
                Err(EvalError::EvaluationFailed(cause)) => {
                    self.annotate_and_emit(id, "fError", json!(cause));
                    self.stats.pruned += 1;
                }
            }
        }
        self.drain_solution_inbox();
    }

    /// Surfaces goal paths the evaluator scored during the last batch.
    fn drain_solution_inbox(&mut self) {
        let mut found = Vec::new();
        if let Some(inbox) = &self.solution_inbox {
            while let Ok(pair) = inbox.try_recv() {
                found.push(pair);
            }
        }
        for (path, cost) in found {
            self.stats.rollout_solutions += 1;
            self.emit(&SearchEvent::SolutionFound { path, cost });
        }
    }

    fn annotate_and_emit(&mut self, id: NodeId, key: &str, value: serde_json::Value) {
        self.arena.annotate(id, key, value.clone());
        self.emit(&SearchEvent::NodeAnnotated {
            id,
            key: key.to_string(),
            value,
        });
    }

    /// Re-evaluates deferred nodes once each; still-unresolvable nodes are
    /// pruned on their second miss.
    fn retry_deferred(&mut self, ctx: &EvalContext) {
        let parked = std::mem::take(&mut self.deferred);
        let mut batch = Vec::new();
        let mut exhausted = Vec::new();
        for id in parked {
            if self.retried.insert(id) {
                batch.push((id, self.arena.path_to(id), self.arena.node(id).is_goal));
            } else {
                exhausted.push(id);
            }
        }
        for id in exhausted {
            self.annotate_and_emit(id, "fError", json!("notComputable"));
            self.stats.pruned += 1;
        }
        if !batch.is_empty() {
            let results = self.evaluate_batch(batch, ctx);
            self.integrate(results, true);
        }
    }

    /// Read access to the node arena, e.g. for inspecting annotations
    /// after a run.
    pub fn arena(&self) -> &Arena<G::Point> {
        &self.arena
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Successor;

    /// Balanced binary tree over heap-indexed points with one goal leaf.
    struct BinaryTree {
        depth: u32,
        goal: u32,
    }

    impl BinaryTree {
        fn level(point: u32) -> u32 {
            31 - point.leading_zeros()
        }

        /// Whether `point` lies on the root-to-goal path.
        fn on_goal_path(&self, point: u32) -> bool {
            let level = Self::level(point);
            let goal_level = Self::level(self.goal);
            level <= goal_level && (self.goal >> (goal_level - level)) == point
        }
    }

    impl GraphGenerator for BinaryTree {
        type Point = u32;

        fn root(&self) -> u32 {
            1
        }

        fn successors(&self, point: &u32) -> Vec<Successor<u32>> {
            if Self::level(*point) < self.depth {
                vec![
                    Successor::or(point * 2, "left"),
                    Successor::or(point * 2 + 1, "right"),
                ]
            } else {
                Vec::new()
            }
        }

        fn is_goal(&self, point: &u32) -> bool {
            *point == self.goal
        }
    }

    /// Exact distance-to-goal evaluator: remaining depth on the goal path,
    /// a large constant off it.
    fn exact_evaluator(
        tree: &Arc<BinaryTree>,
    ) -> impl Fn(&[u32], bool) -> Result<Evaluation, EvalError> + Send + Sync {
        let tree = Arc::clone(tree);
        move |path: &[u32], _is_goal: bool| {
            let point = *path.last().unwrap();
            if tree.on_goal_path(point) {
                let remaining = tree.depth - BinaryTree::level(point);
                Ok(Evaluation::exact(remaining as f64))
            } else {
                Ok(Evaluation::exact(100.0))
            }
        }
    }

    #[test]
    fn exact_search_expands_only_the_optimal_path() {
        let tree = Arc::new(BinaryTree { depth: 4, goal: 21 });
        let evaluator = Arc::new(exact_evaluator(&tree));
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();

        let solutions_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&solutions_seen);
        search.subscribe(Box::new(move |event| {
            if matches!(event, SearchEvent::SolutionFound { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let report = search.run().unwrap();
        assert_eq!(report.termination, Termination::Succeeded);
        assert_eq!(report.stats.expanded, 4, "root plus three inner ancestors");
        assert_eq!(solutions_seen.load(Ordering::SeqCst), 1);

        let best = report.best().unwrap();
        assert_eq!(best.path, vec![1, 2, 5, 10, 21]);
        assert_eq!(best.cost, 0.0);
    }

    #[test]
    fn exhausted_when_no_goal_exists() {
        // Goal 0 is unreachable; every leaf is a dead end.
        let tree = Arc::new(BinaryTree { depth: 3, goal: 0 });
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            Ok(Evaluation::exact(path.len() as f64))
        });
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();
        let report = search.run().unwrap();
        assert_eq!(report.termination, Termination::Exhausted);
        assert!(report.solutions.is_empty());
    }

    #[test]
    fn failed_evaluations_prune_without_aborting() {
        let tree = Arc::new(BinaryTree { depth: 3, goal: 13 });
        // The left subtree always fails; the search must still reach the
        // goal through the right subtree.
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            let point = *path.last().unwrap();
            if point == 2 {
                Err(EvalError::EvaluationFailed("left subtree broken".to_string()))
            } else {
                Ok(Evaluation::exact(f64::from(point)))
            }
        });
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();
        let report = search.run().unwrap();
        assert_eq!(report.termination, Termination::Succeeded);
        assert_eq!(report.stats.pruned, 1);
        assert_eq!(report.best().unwrap().path, vec![1, 3, 6, 13]);
    }

    #[test]
    fn cancellation_terminates_cleanly() {
        let tree = Arc::new(BinaryTree { depth: 10, goal: 1 << 10 });
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            Ok(Evaluation::exact(path.len() as f64))
        });
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();
        search.cancellation_token().store(true, Ordering::Relaxed);

        let report = search.run().unwrap();
        assert_eq!(report.termination, Termination::Cancelled);
    }

    #[test]
    fn cancelled_evaluations_are_not_counted_as_pruned() {
        let tree = Arc::new(BinaryTree { depth: 3, goal: 9 });
        let evaluator = Arc::new(|_path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            Err(EvalError::Cancelled)
        });
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();
        search.cancellation_token().store(true, Ordering::Relaxed);
        let report = search.run().unwrap();

        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(
            report.stats.pruned, 0,
            "abandoned evaluations are not pruning decisions"
        );
        assert_eq!(report.stats.evaluated, 0);
    }

    #[test]
    fn deferred_nodes_get_one_retry_then_prune() {
        // The goal sits below the permanently not-yet-computable node, so
        // the open list drains and the retry pass runs.
        let tree = Arc::new(BinaryTree { depth: 2, goal: 5 });
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            let point = *path.last().unwrap();
            if point == 2 {
                Err(EvalError::NotYetComputable)
            } else {
                Ok(Evaluation::exact(f64::from(point)))
            }
        });
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();
        let report = search.run().unwrap();

        assert_eq!(report.termination, Termination::Exhausted);
        // Deferred once, retried once, then pruned for good.
        assert_eq!(report.stats.deferred, 1);
        assert_eq!(report.stats.pruned, 1);
    }

    #[test]
    fn sampling_exhausted_nodes_are_deprioritized_not_pruned() {
        let tree = Arc::new(BinaryTree { depth: 2, goal: 7 });
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            let point = *path.last().unwrap();
            if point == 2 {
                Err(EvalError::SamplingExhausted)
            } else {
                Ok(Evaluation::exact(f64::from(point)))
            }
        });
        let mut search =
            BestFirstSearch::new(Arc::clone(&tree), evaluator, SearchConfig::default()).unwrap();
        let report = search.run().unwrap();

        assert_eq!(report.termination, Termination::Succeeded);
        assert_eq!(report.stats.pruned, 0);
        assert_eq!(
            report.best().unwrap().path,
            vec![1, 3, 7],
            "the infinite-cost branch must lose to the scored branch"
        );
    }

    /// Diamond-shaped graph: two inner nodes both expand to the same
    /// child point, which the arena reports as a duplicate child set.
    struct Diamond;

    impl GraphGenerator for Diamond {
        type Point = u32;

        fn root(&self) -> u32 {
            0
        }

        fn successors(&self, point: &u32) -> Vec<Successor<u32>> {
            match point {
                0 => vec![Successor::or(10, "a"), Successor::or(20, "b")],
                10 | 20 => vec![Successor::or(30, "join")],
                _ => Vec::new(),
            }
        }

        fn is_goal(&self, point: &u32) -> bool {
            *point == 30
        }
    }

    #[test]
    fn duplicate_child_sets_are_annotated_as_a_warning() {
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            Ok(Evaluation::exact(f64::from(*path.last().unwrap())))
        });
        let mut search =
            BestFirstSearch::new(Arc::new(Diamond), evaluator, SearchConfig::default()).unwrap();
        let report = search.run().unwrap();
        assert_eq!(report.termination, Termination::Succeeded);

        // 10 is expanded first (lower cost) and registers {30}; 20's
        // expansion reproduces it and gets flagged.
        let flagged: Vec<u32> = search
            .arena()
            .iter()
            .filter(|n| n.annotations.contains_key("duplicateChildren"))
            .map(|n| n.point)
            .collect();
        assert_eq!(flagged, vec![20]);
    }

    #[test]
    fn per_node_timeout_substitutes_the_fallback_cost() {
        let tree = Arc::new(BinaryTree { depth: 2, goal: 7 });
        let evaluator = Arc::new(|path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
            let point = *path.last().unwrap();
            if point == 2 {
                Err(EvalError::Timeout)
            } else {
                Ok(Evaluation::exact(f64::from(point)))
            }
        });
        let mut config = SearchConfig::default();
        config.eval_fallback_cost = Some(50.0);
        let mut search = BestFirstSearch::new(Arc::clone(&tree), evaluator, config).unwrap();
        let report = search.run().unwrap();

        assert_eq!(report.termination, Termination::Succeeded);
        let timed_out = search
            .arena()
            .iter()
            .find(|n| n.point == 2)
            .expect("node 2 was created");
        assert_eq!(timed_out.label, Some(50.0));
        assert_eq!(timed_out.annotations["fError"], json!("timeout"));
    }
}
