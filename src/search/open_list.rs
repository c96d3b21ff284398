//! Oversearch-avoidance open list.
//!
//! The frontier of unexpanded nodes, popped under one of three policies:
//! plain cost order, Pareto-front selection over (cost, uncertainty), or a
//! two-phase explore/exploit alternator with optionally adaptive phase
//! lengths. The open list is exclusively owned by the search core and
//! mutated only from the controlling thread.

use std::time::{Duration, Instant};

use crate::config::{OversearchAvoidanceConfig, OversearchAvoidanceMode};
use crate::eval::UncertaintyMeasure;
use crate::graph::NodeId;

/// Phase of the two-phase scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Exploring,
    Exploiting,
}

/// Recomputes the two-phase lengths every `interval` pops.
pub trait PhaseAdjuster: Send {
    /// Returns `(exploration_len, exploitation_len)`; the two must sum to
    /// `interval`.
    fn adjust(
        &self,
        elapsed: Duration,
        timeout: Option<Duration>,
        interval: usize,
    ) -> (usize, usize);
}

/// The default adaptive rule: a clock model that shrinks the exploration
/// budget as the deadline approaches. Without a timeout it keeps the fixed
/// halves.
pub struct ClockModelAdjuster;

impl PhaseAdjuster for ClockModelAdjuster {
    fn adjust(
        &self,
        elapsed: Duration,
        timeout: Option<Duration>,
        interval: usize,
    ) -> (usize, usize) {
        match timeout {
            Some(total) if total > Duration::ZERO => {
                let remaining =
                    1.0 - (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
                let exploration = ((interval as f64) * remaining).round() as usize;
                let exploration = exploration.min(interval);
                (exploration, interval - exploration)
            }
            _ => (interval / 2, interval - interval / 2),
        }
    }
}

struct PhaseState {
    current: Phase,
    steps_remaining: usize,
    exploration_len: usize,
    exploitation_len: usize,
}

impl PhaseState {
    fn new(interval: usize) -> Self {
        let exploration_len = interval / 2;
        let exploitation_len = interval - exploration_len;
        PhaseState {
            current: Phase::Exploring,
            steps_remaining: exploration_len,
            exploration_len,
            exploitation_len,
        }
    }

    fn len_of(&self, phase: Phase) -> usize {
        match phase {
            Phase::Exploring => self.exploration_len,
            Phase::Exploiting => self.exploitation_len,
        }
    }

    /// Flips the phase when the current one is exhausted, skipping a
    /// zero-length phase.
    fn advance(&mut self) {
        if self.steps_remaining > 0 {
            return;
        }
        let flipped = match self.current {
            Phase::Exploring => Phase::Exploiting,
            Phase::Exploiting => Phase::Exploring,
        };
        self.current = flipped;
        self.steps_remaining = self.len_of(flipped);
        if self.steps_remaining == 0 {
            let other = match flipped {
                Phase::Exploring => Phase::Exploiting,
                Phase::Exploiting => Phase::Exploring,
            };
            self.current = other;
            self.steps_remaining = self.len_of(other).max(1);
        }
    }
}

struct Entry<T> {
    node: NodeId,
    point: T,
    measure: UncertaintyMeasure,
    seq: u64,
}

/// The open list with its scheduling policy.
pub struct OpenList<T> {
    entries: Vec<Entry<T>>,
    seq: u64,
    config: OversearchAvoidanceConfig,
    phase: Option<PhaseState>,
    adjuster: Box<dyn PhaseAdjuster>,
    distance_metric: Option<Box<dyn Fn(&T, &T) -> f64 + Send>>,
    emitted: Vec<T>,
    started: Instant,
    pops: u64,
}

impl<T: Clone> OpenList<T> {
    pub fn new(config: OversearchAvoidanceConfig) -> Self {
        let phase = match config.mode {
            OversearchAvoidanceMode::TwoPhase => Some(PhaseState::new(config.interval)),
            _ => None,
        };
        OpenList {
            entries: Vec::new(),
            seq: 0,
            config,
            phase,
            adjuster: Box::new(ClockModelAdjuster),
            distance_metric: None,
            emitted: Vec::new(),
            started: Instant::now(),
            pops: 0,
        }
    }

    /// Replaces the adaptive phase-length rule.
    pub fn with_adjuster(mut self, adjuster: Box<dyn PhaseAdjuster>) -> Self {
        self.set_adjuster(adjuster);
        self
    }

    pub fn set_adjuster(&mut self, adjuster: Box<dyn PhaseAdjuster>) {
        self.adjuster = adjuster;
    }

    /// Installs the solution-distance metric used by the exploration
    /// diversity filter. Without a metric the filter is skipped.
    pub fn with_distance_metric(mut self, metric: Box<dyn Fn(&T, &T) -> f64 + Send>) -> Self {
        self.set_distance_metric(metric);
        self
    }

    pub fn set_distance_metric(&mut self, metric: Box<dyn Fn(&T, &T) -> f64 + Send>) {
        self.distance_metric = Some(metric);
    }

    pub fn push(&mut self, node: NodeId, point: T, measure: UncertaintyMeasure) {
        let seq = self.seq;
        self.seq += 1;
        self.entries.push(Entry {
            node,
            point,
            measure,
            seq,
        });
    }

    /// Records an emitted solution's terminal point for the diversity
    /// filter.
    pub fn note_solution(&mut self, point: T) {
        self.emitted.push(point);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The phase the most recent pop ran under (TwoPhase only).
    pub fn current_phase(&self) -> Option<Phase> {
        self.phase.as_ref().map(|p| p.current)
    }

    /// Pops the next candidate under the configured policy. `incumbent` is
    /// the best solution cost found so far, used by the exploitation
    /// threshold.
    pub fn pop(&mut self, incumbent: Option<f64>) -> Option<(NodeId, T, UncertaintyMeasure)> {
        if self.entries.is_empty() {
            return None;
        }

        let index = match self.config.mode {
            OversearchAvoidanceMode::None => self.min_cost_index(),
            OversearchAvoidanceMode::ParetoFront => self.pareto_index(),
            OversearchAvoidanceMode::TwoPhase => {
                self.tick_phase();
                let phase = self.phase.as_ref().map(|p| p.current);
                match phase {
                    Some(Phase::Exploiting) => self.exploit_index(incumbent),
                    _ => self.explore_index(),
                }
            }
        };

        self.pops += 1;
        if let Some(phase) = self.phase.as_mut() {
            phase.steps_remaining = phase.steps_remaining.saturating_sub(1);
        }

        let entry = self.entries.remove(index);
        Some((entry.node, entry.point, entry.measure))
    }

    fn tick_phase(&mut self) {
        let interval = self.config.interval;
        if self.config.dynamic_phase_adjustment
            && interval > 0
            && self.pops % interval as u64 == 0
        {
            let (exploration, exploitation) =
                self.adjuster
                    .adjust(self.started.elapsed(), self.config.timeout, interval);
            if let Some(phase) = self.phase.as_mut() {
                phase.exploration_len = exploration;
                phase.exploitation_len = exploitation;
            }
        }
        if let Some(phase) = self.phase.as_mut() {
            phase.advance();
        }
    }

    /// Lowest cost, ties broken by insertion order.
    fn min_cost_index(&self) -> usize {
        self.entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.measure
                    .cost
                    .total_cmp(&b.measure.cost)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(i, _)| i)
            .expect("pop is only called on a nonempty list")
    }

    /// Earliest-inserted candidate not dominated by any open candidate.
    fn pareto_index(&self) -> usize {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, candidate)| {
                !self
                    .entries
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != *i && other.measure.dominates(&candidate.measure))
            })
            .min_by_key(|(_, candidate)| candidate.seq)
            .map(|(i, _)| i)
            .expect("a finite set always has a non-dominated element")
    }

    /// Lowest cost among candidates within the exploitation threshold of
    /// the incumbent; plain lowest cost when nothing qualifies.
    fn exploit_index(&self, incumbent: Option<f64>) -> usize {
        let threshold = self.config.exploitation_threshold;
        let qualified = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| match incumbent {
                Some(best) => e.measure.cost - best <= threshold,
                None => true,
            })
            .min_by(|(_, a), (_, b)| {
                a.measure
                    .cost
                    .total_cmp(&b.measure.cost)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(i, _)| i);
        qualified.unwrap_or_else(|| self.min_cost_index())
    }

    /// Highest uncertainty among candidates over the exploration threshold
    /// that pass the diversity filter; plain lowest cost when nothing
    /// qualifies.
    fn explore_index(&self) -> usize {
        let threshold = self.config.exploration_threshold;
        let qualified = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.measure.uncertainty > threshold && self.diverse(&e.point))
            .max_by(|(_, a), (_, b)| {
                a.measure
                    .uncertainty
                    .total_cmp(&b.measure.uncertainty)
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(i, _)| i);
        qualified.unwrap_or_else(|| self.min_cost_index())
    }

    /// Whether a candidate point is far enough from every emitted solution.
    fn diverse(&self, point: &T) -> bool {
        match &self.distance_metric {
            Some(metric) => self
                .emitted
                .iter()
                .all(|solution| metric(point, solution) > self.config.min_solution_distance),
            None => true,
        }
    }
}
