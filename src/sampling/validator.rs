//! Hypothesis test that checks sampled nodes against their ground-truth
//! distribution. Used by tests and by operators checking a fresh build.

use crate::node::NodeId;
use rand::{Rng, RngCore};
use std::collections::{HashMap, HashSet};
use tracing::{error, info};

/// Two-sided z-quantile of the acceptance band.
const QUANTILE: f64 = 2.81;
const MAX_FAILURES: usize = 1;
const ROUNDS: usize = 5;

/// Checks `sampled` against `ground_truth` (`(node, probability)` pairs).
///
/// Up to five buckets are picked at random; each must see a count within
/// `trials * p ± 2.81 * sqrt(trials * p * (1 - p))`. At most one bucket may
/// fall outside its band. A distribution that is empty or lists a node twice
/// never passes.
pub fn validate(
    ground_truth: &[(NodeId, f32)],
    sampled: &[NodeId],
    rng: &mut dyn RngCore,
) -> bool {
    if !check_distribution(ground_truth) {
        return false;
    }

    let k = ROUNDS.min(ground_truth.len());
    let picked = draw_hypotheses(k, ground_truth, rng);

    let mut counts: HashMap<NodeId, usize> = picked.iter().map(|&(node, _)| (node, 0)).collect();
    for node in sampled {
        if let Some(count) = counts.get_mut(node) {
            *count += 1;
        }
    }

    let trials = sampled.len() as f64;
    let mut failures = 0;
    for (node, prob) in &picked {
        let count = counts.get(node).copied().unwrap_or(0) as f64;
        let prob = *prob as f64;
        let mean = trials * prob;
        let interval = QUANTILE * (trials * prob * (1.0 - prob)).sqrt();
        if count < mean - interval || count > mean + interval {
            info!(
                "sampled count of node {} is {}, outside [{}, {}]",
                node,
                count,
                mean - interval,
                mean + interval
            );
            failures += 1;
        }
    }
    failures <= MAX_FAILURES
}

fn check_distribution(distribution: &[(NodeId, f32)]) -> bool {
    let mut seen = HashSet::with_capacity(distribution.len());
    for (node, _) in distribution {
        if !seen.insert(*node) {
            error!("duplicate node {} in distribution", node);
            return false;
        }
    }
    !seen.is_empty()
}

/// `k` random draws, keeping the distinct ones.
fn draw_hypotheses(
    k: usize,
    distribution: &[(NodeId, f32)],
    rng: &mut dyn RngCore,
) -> Vec<(NodeId, f32)> {
    let mut picked: Vec<(NodeId, f32)> = Vec::with_capacity(k);
    for _ in 0..k {
        let next = distribution[rng.random_range(0..distribution.len())];
        if !picked.iter().any(|p| p.0 == next.0) {
            picked.push(next);
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{new_sampling, SamplingKind};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn distribution() -> Vec<(NodeId, f32)> {
        vec![(10, 0.1), (11, 0.4), (12, 0.2), (13, 0.3)]
    }

    fn draw(kind: SamplingKind, trials: usize, rng: &mut ChaCha8Rng) -> Vec<NodeId> {
        let dist = distribution();
        let probs: Vec<f32> = dist.iter().map(|p| p.1).collect();
        let sampling = new_sampling(kind, &probs).unwrap();
        (0..trials).map(|_| dist[sampling.sample(rng)].0).collect()
    }

    #[test]
    fn test_alias_passes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let sampled = draw(SamplingKind::Alias, 10_000, &mut rng);
        assert!(validate(&distribution(), &sampled, &mut rng));
    }

    #[test]
    fn test_partial_sum_passes() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let sampled = draw(SamplingKind::PartialSum, 10_000, &mut rng);
        assert!(validate(&distribution(), &sampled, &mut rng));
    }

    #[test]
    fn test_skewed_samples_fail() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let flat: Vec<(NodeId, f32)> = (0..50).map(|n| (n, 0.02)).collect();
        let sampled = vec![0; 10_000];
        assert!(!validate(&flat, &sampled, &mut rng));
    }

    #[test]
    fn test_bad_distribution_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(!validate(&[], &[1, 2], &mut rng));
        assert!(!validate(&[(1, 0.5), (1, 0.5)], &[1, 1], &mut rng));
    }
}
