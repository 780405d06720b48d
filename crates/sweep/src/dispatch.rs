//! Bounded dispatcher
//!
//! Runs work items on at most `limit` worker threads, never more threads than
//! items, and returns once every item has finished. Results come back in
//! completion order.

use crate::error::{Result, SweepError};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

/// Run `work` for every item with at most `limit` items in flight.
///
/// A limit of 0 or 1 runs the items sequentially on the calling thread.
pub fn dispatch<T, R, F>(items: impl IntoIterator<Item = T>, limit: usize, work: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    let items: Vec<T> = items.into_iter().collect();
    if limit <= 1 || items.len() <= 1 {
        return Ok(items.into_iter().map(work).collect());
    }

    let results: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::with_capacity(items.len())));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit.min(items.len()))
        .thread_name(|i| format!("sweep-worker-{i}"))
        .build()
        .map_err(|e| SweepError::Configuration(format!("failed to create worker pool: {e}")))?;

    pool.install(|| {
        items.into_par_iter().for_each(|item| {
            let result = work(item);
            push_result(&results, result);
        });
    });

    into_results(results)
}

fn push_result<R>(results: &Arc<Mutex<Vec<R>>>, result: R) {
    match results.lock() {
        Ok(mut locked) => locked.push(result),
        Err(poisoned) => poisoned.into_inner().push(result),
    }
}

fn into_results<R>(results: Arc<Mutex<Vec<R>>>) -> Result<Vec<R>> {
    let mutex = Arc::try_unwrap(results).map_err(|_| {
        SweepError::Configuration("failed to collect results: shared result state".into())
    })?;

    match mutex.into_inner() {
        Ok(collected) => Ok(collected),
        Err(poisoned) => Ok(poisoned.into_inner()),
    }
}
