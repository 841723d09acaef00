//! Discrete sampling kernels.
//!
//! Every kernel is built once from a probability vector and is immutable
//! afterwards, so draws need no locking. The random source is either passed
//! in explicitly (`sample*`) or taken from the thread-local generator
//! (`next*`).

mod alias;
mod partial_sum;
mod uniform;
mod unigram;
pub mod validator;

pub use alias::AliasSampling;
pub use partial_sum::PartialSumSampling;
pub use uniform::UniformSampling;
pub use unigram::UnigramSampling;

pub use crate::config::SamplingKind;
use crate::error::{Error, Result};
use rand::RngCore;

/// A table that answers "draw one index" for a fixed distribution.
pub trait Sampling: Send + Sync {
    fn kind(&self) -> SamplingKind;

    /// Number of indices the table was built over.
    fn len(&self) -> usize;

    fn sample(&self, rng: &mut dyn RngCore) -> usize;

    /// Draws an index restricted to `[begin, end)`.
    fn sample_in_range(&self, rng: &mut dyn RngCore, begin: usize, end: usize) -> Result<usize>;

    /// Whether `sample` can ever return `index`.
    fn is_reachable(&self, index: usize) -> bool;

    /// Number of reachable indices.
    fn support_len(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_reachable(i)).count()
    }

    fn next(&self) -> usize {
        self.sample(&mut rand::rng())
    }

    fn next_in_range(&self, begin: usize, end: usize) -> Result<usize> {
        self.sample_in_range(&mut rand::rng(), begin, end)
    }

    fn supports_range(&self) -> bool {
        self.kind().supports_range()
    }
}

/// Builds the kernel selected by `kind` over `probs`.
///
/// # Arguments
///
/// * `kind` - Which kernel to build.
/// * `probs` - Non-negative weights, one per index. They need not sum to 1.
///
/// # Returns
///
/// * `Result<Box<dyn Sampling>>` - The immutable table, or the build error.
pub fn new_sampling(kind: SamplingKind, probs: &[f32]) -> Result<Box<dyn Sampling>> {
    let sampling: Box<dyn Sampling> = match kind {
        SamplingKind::Uniform => Box::new(UniformSampling::new(probs)?),
        SamplingKind::Alias => Box::new(AliasSampling::new(probs)?),
        SamplingKind::Unigram => Box::new(UnigramSampling::new(probs)?),
        SamplingKind::PartialSum => Box::new(PartialSumSampling::new(probs)?),
    };
    Ok(sampling)
}

fn check_probs(kind: SamplingKind, probs: &[f32]) -> Result<()> {
    if probs.is_empty() {
        return Err(Error::config(format!(
            "{} sampling needs a non-empty probability vector",
            kind.name()
        )));
    }
    if let Some(bad) = probs.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(Error::data(format!(
            "{} sampling got an invalid probability: {}",
            kind.name(),
            bad
        )));
    }
    Ok(())
}

fn check_range(len: usize, begin: usize, end: usize) -> Result<()> {
    if begin >= end || end > len {
        return Err(Error::data(format!(
            "sampling range [{}, {}) is empty or exceeds table size {}",
            begin, end, len
        )));
    }
    Ok(())
}
