//! Randomized depth-first completion.
//!
//! A reduced search used by the rollout evaluator: depth-first from a
//! partial path to any goal, with a purely randomized successor order and
//! no look-ahead. "No completion found" is a normal, inspectable outcome,
//! not an error.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::eval::{EvalContext, EvalError};
use crate::graph::GraphGenerator;

/// Extends `prefix` to a goal-terminated path by randomized depth-first
/// descent. Returns `Ok(None)` when the subtree under the prefix contains
/// no reachable goal; propagates cancellation and deadline expiry, which
/// are checked once per expansion.
pub fn complete<G: GraphGenerator>(
    generator: &G,
    prefix: &[G::Point],
    rng: &mut SmallRng,
    ctx: &EvalContext,
) -> Result<Option<Vec<G::Point>>, EvalError> {
    debug_assert!(!prefix.is_empty(), "completion needs a nonempty prefix");
    let mut stack: Vec<Vec<G::Point>> = vec![prefix.to_vec()];

    while let Some(path) = stack.pop() {
        ctx.check()?;

        let last = path.last().expect("paths on the stack are nonempty");
        if generator.is_goal(last) {
            return Ok(Some(path));
        }

        let mut successors = generator.successors(last);
        if successors.is_empty() {
            // Dead end; backtrack to the next stacked alternative.
            continue;
        }
        successors.shuffle(rng);
        for successor in successors {
            let mut extended = path.clone();
            extended.push(successor.point);
            stack.push(extended);
        }
    }

    Ok(None)
}
