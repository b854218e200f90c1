use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

/// Runs `task` over `items` on a pool of at most `max_workers` threads.
///
/// Output slot `i` always belongs to `items[i]`, whatever order the workers
/// finish in. A panic inside one task is caught and returned in that slot;
/// the remaining items still run.
pub fn run_bounded<T, R, F>(
    items: &[T],
    max_workers: usize,
    task: F,
) -> Result<Vec<thread::Result<R>>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(max_workers.clamp(1, items.len()))
        .thread_name(|index| format!("doceval-worker-{index}"))
        .build()
        .context("failed to start worker pool")?;

    Ok(pool.install(|| {
        items
            .par_iter()
            .enumerate()
            .map(|(index, item)| catch_unwind(AssertUnwindSafe(|| task(index, item))))
            .collect()
    }))
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
