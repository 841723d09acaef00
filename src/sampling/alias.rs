use super::{check_probs, Sampling, SamplingKind};
use crate::error::{Error, Result};
use rand::{Rng, RngCore};

/// Walker's alias method: O(n) build, O(1) draw.
#[derive(Debug, Clone)]
pub struct AliasSampling {
    /// Probability of keeping bucket `i` rather than jumping to its alias.
    probs: Vec<f32>,
    alias: Vec<u32>,
    reachable: Vec<bool>,
    support: usize,
}

impl AliasSampling {
    pub fn new(probs: &[f32]) -> Result<Self> {
        check_probs(SamplingKind::Alias, probs)?;
        let n = probs.len();
        if n > u32::MAX as usize {
            return Err(Error::Capacity(format!(
                "alias table of {} buckets exceeds {}",
                n,
                u32::MAX
            )));
        }
        let sum: f64 = probs.iter().map(|&p| p as f64).sum();
        if sum <= 0.0 {
            return Err(Error::data("alias sampling needs a positive probability mass"));
        }

        // Scale so the average bucket holds exactly 1.0.
        let mut scaled: Vec<f64> = probs.iter().map(|&p| p as f64 * n as f64 / sum).collect();
        let mut alias: Vec<u32> = (0..n as u32).collect();

        let mut smaller = Vec::new();
        let mut larger = Vec::new();
        for (i, &p) in scaled.iter().enumerate() {
            if p < 1.0 {
                smaller.push(i);
            } else {
                larger.push(i);
            }
        }

        while !smaller.is_empty() && !larger.is_empty() {
            let (Some(s), Some(l)) = (smaller.pop(), larger.pop()) else {
                break;
            };
            alias[s] = l as u32;
            scaled[l] += scaled[s] - 1.0;
            if scaled[l] < 1.0 {
                smaller.push(l);
            } else {
                larger.push(l);
            }
        }

        // Whatever is left is 1.0 up to rounding.
        for i in smaller.into_iter().chain(larger) {
            scaled[i] = 1.0;
        }

        let probs: Vec<f32> = scaled.into_iter().map(|p| p as f32).collect();
        let mut reachable = vec![false; n];
        for (k, &keep) in probs.iter().enumerate() {
            if keep > 0.0 {
                reachable[k] = true;
            }
            if keep < 1.0 {
                reachable[alias[k] as usize] = true;
            }
        }
        let support = reachable.iter().filter(|&&r| r).count();
        Ok(AliasSampling {
            probs,
            alias,
            reachable,
            support,
        })
    }
}

impl Sampling for AliasSampling {
    fn kind(&self) -> SamplingKind {
        SamplingKind::Alias
    }

    fn len(&self) -> usize {
        self.probs.len()
    }

    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        let k = rng.random_range(0..self.probs.len());
        if rng.random::<f32>() < self.probs[k] {
            k
        } else {
            self.alias[k] as usize
        }
    }

    fn sample_in_range(&self, _rng: &mut dyn RngCore, _begin: usize, _end: usize) -> Result<usize> {
        Err(Error::RangeUnsupported(SamplingKind::Alias.name()))
    }

    fn is_reachable(&self, index: usize) -> bool {
        self.reachable.get(index).copied().unwrap_or(false)
    }

    fn support_len(&self) -> usize {
        self.support
    }
}
