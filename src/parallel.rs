use crate::error::{Error, Result};
use rayon::ThreadPool;

/// Fixed-size worker pool for the startup build phases.
pub(crate) fn thread_pool(threads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| Error::config(format!("failed to build thread pool: {}", e)))
}

/// Slice length giving each of `threads` workers one disjoint range.
pub(crate) fn chunk_len(len: usize, threads: usize) -> usize {
    len.div_ceil(threads.max(1)).max(1)
}
