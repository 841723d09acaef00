use super::{check_probs, check_range, Sampling, SamplingKind};
use crate::error::Result;
use rand::{Rng, RngCore};

/// Equal-probability draws over `n` indices. Only the size is stored.
#[derive(Debug, Clone)]
pub struct UniformSampling {
    size: usize,
}

impl UniformSampling {
    pub fn new(probs: &[f32]) -> Result<Self> {
        check_probs(SamplingKind::Uniform, probs)?;
        Ok(UniformSampling { size: probs.len() })
    }
}

impl Sampling for UniformSampling {
    fn kind(&self) -> SamplingKind {
        SamplingKind::Uniform
    }

    fn len(&self) -> usize {
        self.size
    }

    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        rng.random_range(0..self.size)
    }

    fn sample_in_range(&self, rng: &mut dyn RngCore, begin: usize, end: usize) -> Result<usize> {
        check_range(self.size, begin, end)?;
        Ok(rng.random_range(begin..end))
    }

    fn is_reachable(&self, index: usize) -> bool {
        index < self.size
    }

    fn support_len(&self) -> usize {
        self.size
    }
}
