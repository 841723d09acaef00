use super::{check_probs, Sampling, SamplingKind};
use crate::error::{Error, Result};
use rand::{Rng, RngCore};
use tracing::warn;

const MAX_TABLE_SIZE: usize = 1_000_000_000;
const TABLE_RATIO: usize = 10;
const POWER: f64 = 0.75;

/// word2vec-style unigram table.
///
/// Each non-zero entry gets a number of slots proportional to `freq^0.75`,
/// and at least one, so every non-zero entry stays drawable. A draw is one
/// uniform slot lookup. Ranged draws are not possible.
#[derive(Debug, Clone)]
pub struct UnigramSampling {
    table: Vec<u32>,
    size: usize,
    reachable: Vec<bool>,
    support: usize,
}

impl UnigramSampling {
    pub fn new(freqs: &[f32]) -> Result<Self> {
        check_probs(SamplingKind::Unigram, freqs)?;

        let mut entries: Vec<(usize, f32, f64)> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f > 0.0)
            .map(|(i, &f)| (i, f, (f as f64).powf(POWER)))
            .collect();
        if entries.is_empty() {
            return Err(Error::data("unigram sampling needs at least one non-zero frequency"));
        }
        if freqs.len() > u32::MAX as usize {
            return Err(Error::Capacity(format!(
                "unigram table cannot index {} entries",
                freqs.len()
            )));
        }
        let acc: f64 = entries.iter().map(|e| e.2).sum();

        // Stable: equal frequencies keep their input order.
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut table_size = entries.len().saturating_mul(TABLE_RATIO);
        if table_size > MAX_TABLE_SIZE {
            warn!(
                "unigram table of {} slots capped at {}",
                table_size, MAX_TABLE_SIZE
            );
            table_size = MAX_TABLE_SIZE;
        }
        if table_size <= 1 {
            return Err(Error::Capacity(format!(
                "unigram table size must be > 1, got {}",
                table_size
            )));
        }

        let mut table: Vec<u32> = Vec::with_capacity(table_size);
        let mut reachable = vec![false; freqs.len()];
        let mut support = 0;
        for &(index, _, weight) in &entries {
            let room = MAX_TABLE_SIZE - table.len();
            if room == 0 {
                break;
            }
            let slots = ((weight / acc * table_size as f64).round() as usize).clamp(1, room);
            table.extend(std::iter::repeat(index as u32).take(slots));
            reachable[index] = true;
            support += 1;
        }
        if support < entries.len() {
            warn!(
                "unigram table full: {} of {} non-zero entries cannot be drawn",
                entries.len() - support,
                entries.len()
            );
        }

        Ok(UnigramSampling {
            table,
            size: freqs.len(),
            reachable,
            support,
        })
    }
}

impl Sampling for UnigramSampling {
    fn kind(&self) -> SamplingKind {
        SamplingKind::Unigram
    }

    fn len(&self) -> usize {
        self.size
    }

    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        self.table[rng.random_range(0..self.table.len())] as usize
    }

    fn sample_in_range(&self, _rng: &mut dyn RngCore, _begin: usize, _end: usize) -> Result<usize> {
        Err(Error::RangeUnsupported(SamplingKind::Unigram.name()))
    }

    fn is_reachable(&self, index: usize) -> bool {
        self.reachable.get(index).copied().unwrap_or(false)
    }

    fn support_len(&self) -> usize {
        self.support
    }
}
