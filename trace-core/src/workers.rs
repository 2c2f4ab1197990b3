//! Fixed-size worker pool for embarrassingly-parallel pipeline steps
//! (§4.J, §5).
//!
//! A `rayon::ThreadPool` sized to `W` stands in for the spec's literal
//! strided worker-pool-plus-completion-channel model:
//! `par_iter().map(...).collect()` is the preallocated-output-plus-
//! barrier-join in one expression, and `rayon::current_thread_index()`
//! supplies the stable `0..W` index a closure needs to reach its private
//! per-worker resource (a Dijkstra graph copy, for map-matching).

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::Error;

/// Default worker count when the caller does not override it (§4.J).
pub const DEFAULT_WORKERS: usize = 12;

/// Fixed-size pool of cooperative parallel workers.
pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
}

impl WorkerPool {
    /// Builds a pool with exactly `size` threads (clamped to at least 1).
    ///
    /// # Errors
    /// Returns an error if the underlying thread pool fails to start.
    pub fn new(size: usize) -> Result<Self, Error> {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(size).build()?;
        Ok(Self { pool, size })
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Maps `f` over `items` inside this pool, handing each call the
    /// `0..size` worker index that produced it. Input order is preserved
    /// in the output (§5 "Ordering").
    pub fn map_indexed<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T, usize) -> R + Sync,
    {
        let size = self.size;
        self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let worker_index = rayon::current_thread_index().unwrap_or(0) % size;
                    f(item, worker_index)
                })
                .collect()
        })
    }
}
