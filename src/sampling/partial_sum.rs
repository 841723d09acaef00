use super::{check_probs, check_range, Sampling, SamplingKind};
use crate::error::{Error, Result};
use rand::{Rng, RngCore};

/// Prefix sums with binary search. The only weighted kernel that can draw
/// from a sub-range, which meta-path walks rely on.
#[derive(Debug, Clone)]
pub struct PartialSumSampling {
    cumulative: Vec<f64>,
    support: usize,
}

impl PartialSumSampling {
    pub fn new(probs: &[f32]) -> Result<Self> {
        check_probs(SamplingKind::PartialSum, probs)?;
        let mut acc = 0.0f64;
        let cumulative: Vec<f64> = probs
            .iter()
            .map(|&p| {
                acc += p as f64;
                acc
            })
            .collect();
        if acc <= 0.0 {
            return Err(Error::data("partial sum sampling needs a positive probability mass"));
        }
        let mut sampling = PartialSumSampling {
            cumulative,
            support: 0,
        };
        sampling.support = (0..probs.len()).filter(|&i| sampling.is_reachable(i)).count();
        Ok(sampling)
    }

    fn sum_before(&self, index: usize) -> f64 {
        if index == 0 {
            0.0
        } else {
            self.cumulative[index - 1]
        }
    }
}

impl Sampling for PartialSumSampling {
    fn kind(&self) -> SamplingKind {
        SamplingKind::PartialSum
    }

    fn len(&self) -> usize {
        self.cumulative.len()
    }

    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        let n = self.cumulative.len();
        // Mass is known to be positive, so the full range cannot fail.
        self.sample_in_range(rng, 0, n).unwrap_or(n - 1)
    }

    fn sample_in_range(&self, rng: &mut dyn RngCore, begin: usize, end: usize) -> Result<usize> {
        check_range(self.cumulative.len(), begin, end)?;
        let low = self.sum_before(begin);
        let high = self.cumulative[end - 1];
        if high <= low {
            return Err(Error::data(format!(
                "sampling range [{}, {}) has no probability mass",
                begin, end
            )));
        }
        let target = low + rng.random::<f64>() * (high - low);
        // First cumulative value strictly above the draw, so zero-weight
        // entries are never picked.
        let offset = self.cumulative[begin..end].partition_point(|&c| c <= target);
        Ok((begin + offset).min(end - 1))
    }

    fn is_reachable(&self, index: usize) -> bool {
        index < self.cumulative.len() && self.cumulative[index] > self.sum_before(index)
    }

    fn support_len(&self) -> usize {
        self.support
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_ranged_follows_local_weights() {
        let sampling = PartialSumSampling::new(&[5.0, 1.0, 3.0, 0.0, 9.0]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut counts = [0usize; 5];
        let trials = 40_000;
        for _ in 0..trials {
            counts[sampling.sample_in_range(&mut rng, 1, 4).unwrap()] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[3], 0);
        assert_eq!(counts[4], 0);
        let share = counts[2] as f64 / trials as f64;
        assert!((share - 0.75).abs() < 0.02, "share {}", share);
    }

    #[test]
    fn test_zero_mass_range_is_error() {
        let sampling = PartialSumSampling::new(&[1.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(sampling.next_in_range(1, 3).is_err());
    }
}
