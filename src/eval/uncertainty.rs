//! Uncertainty estimation from rollout dispersion.
//!
//! A node whose rollouts agree closely is considered well-characterized
//! even deep in the tree; a node with wildly divergent outcomes is flagged
//! uncertain regardless of its mean score.

/// Computes a dispersion score for a node from its path, the solution path
/// it was completed to (if any), and the sampled rollout scores.
pub trait UncertaintySource<T>: Send + Sync {
    fn uncertainty(&self, path: &[T], solution: Option<&[T]>, scores: &[f64]) -> f64;
}

/// The standard estimator: a positional baseline scaled by rollout-score
/// agreement.
///
/// The baseline is the fraction of the solution path lying beyond the node
/// (1.0 when no solution is known). It is scaled by
/// `1 - clamp(sample_variance / mean, 0, 1)`; with fewer than 2 samples or
/// a zero mean the scale stays at 1.0. The clamp keeps the result finite
/// and in `[0, 1]` where the unguarded ratio would go negative or NaN.
pub struct VarianceUncertainty;

impl<T> UncertaintySource<T> for VarianceUncertainty {
    fn uncertainty(&self, path: &[T], solution: Option<&[T]>, scores: &[f64]) -> f64 {
        let positional = match solution {
            Some(solution) if solution.len() > path.len() => {
                (solution.len() - path.len()) as f64 / solution.len() as f64
            }
            Some(_) => 0.0,
            None => 1.0,
        };

        let scale = if scores.len() >= 2 {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            if mean.abs() > f64::EPSILON {
                let variance = scores
                    .iter()
                    .map(|s| (s - mean) * (s - mean))
                    .sum::<f64>()
                    / (scores.len() - 1) as f64;
                1.0 - (variance / mean).clamp(0.0, 1.0)
            } else {
                1.0
            }
        } else {
            1.0
        };

        (positional * scale).clamp(0.0, 1.0)
    }
}
