use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use andor_search::config::SearchConfig;
use andor_search::eval::{EvalError, Evaluation, RandomCompletionEvaluator, SolutionError};
use andor_search::graph::{GraphGenerator, Successor};
use andor_search::search::BestFirstSearch;

/// Balanced binary tree over heap indices; every leaf at `depth` is a goal.
struct LeafTree {
    depth: u32,
}

impl LeafTree {
    fn level(point: u32) -> u32 {
        31 - point.leading_zeros()
    }
}

impl GraphGenerator for LeafTree {
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
        Self::level(*point) == self.depth
    }
}

struct Queens {
    n: u8,
}

impl Queens {
    fn attacks(placed: &[u8], row: usize, col: u8) -> bool {
        placed.iter().enumerate().any(|(r, &c)| {
            c == col || (row - r) as i16 == (i16::from(col) - i16::from(c)).abs()
        })
    }
}

impl GraphGenerator for Queens {
    type Point = Vec<u8>;

    fn root(&self) -> Vec<u8> {
        Vec::new()
    }

    fn successors(&self, point: &Vec<u8>) -> Vec<Successor<Vec<u8>>> {
        let row = point.len();
        if row >= self.n as usize {
            return Vec::new();
        }
        (0..self.n)
            .filter(|&col| !Self::attacks(point, row, col))
            .map(|col| {
                let mut extended = point.clone();
                extended.push(col);
                Successor::or(extended, format!("col{col}"))
            })
            .collect()
    }

    fn is_goal(&self, point: &Vec<u8>) -> bool {
        point.len() == self.n as usize
    }
}

fn bench_exact_best_first(c: &mut Criterion) {
    c.bench_function("best_first_exact_depth12", |b| {
        b.iter(|| {
            let tree = Arc::new(LeafTree { depth: 12 });
            let evaluator = Arc::new(
                |path: &[u32], _g: bool| -> Result<Evaluation, EvalError> {
                    Ok(Evaluation::exact(f64::from(*path.last().unwrap())))
                },
            );
            let mut search =
                BestFirstSearch::new(tree, evaluator, SearchConfig::default()).unwrap();
            black_box(search.run().unwrap())
        })
    });
}

fn bench_rollout_queens(c: &mut Criterion) {
    c.bench_function("rollout_queens6_samples3", |b| {
        b.iter(|| {
            let generator = Arc::new(Queens { n: 6 });
            let scorer = |path: &[Vec<u8>]| -> Result<f64, SolutionError> {
                let board = path.last().ok_or_else(|| {
                    SolutionError::Domain("empty solution path".to_string())
                })?;
                Ok(board.iter().map(|&c| f64::from(c)).sum())
            };
            let evaluator = Arc::new(
                RandomCompletionEvaluator::new(Arc::clone(&generator), scorer, 3, 42).unwrap(),
            );
            let mut search =
                BestFirstSearch::new(generator, evaluator, SearchConfig::default()).unwrap();
            black_box(search.run().unwrap())
        })
    });
}

criterion_group!(benches, bench_exact_best_first, bench_rollout_queens);
criterion_main!(benches);
