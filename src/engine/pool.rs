// src/engine/pool.rs
//
// Global worker pool for decode, pipeline, encode and capacity work.
//
// A single rayon pool is shared by every request instead of one pool per call:
// threads are reused and the thread count stays predictable. Async callers
// hand work over with `spawn` and await the result through a tokio oneshot,
// so the calling task never blocks on pixel work.
//
// The pool is built lazily on first use; later changes to the environment
// have no effect.

use crate::engine::common::{panic_message, EngineResult};
use crate::error::EngineError;
use rayon::ThreadPool;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use tokio::sync::oneshot;
use tracing::warn;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

/// Overrides the detected worker count
const THREADS_ENV: &str = "DECOLGEN_WORKER_THREADS";

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn worker_threads() -> usize {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_RAYON_THREADS)
        })
        .max(MIN_RAYON_THREADS)
}

/// The shared pool, or `None` when no pool could be built at all. Work then
/// runs on rayon's global pool.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = worker_threads();
            let build = |threads: usize| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("decolgen-worker-{i}"))
                    .build()
            };
            match build(num_threads) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(
                        target: "decolgen::pool",
                        threads = num_threads,
                        error = %e,
                        "falling back to a minimal worker pool"
                    );
                    build(MIN_RAYON_THREADS).ok()
                }
            }
        })
        .as_ref()
}

/// Run `f` on the worker pool and await its result.
///
/// A panic inside `f` becomes `InternalPanic`; it never unwinds into the
/// awaiting task.
pub async fn spawn<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job = move || {
        let result = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(EngineError::internal_panic(format!(
                "{label}: {}",
                panic_message(payload.as_ref())
            ))),
        };
        // The receiver may be gone when the caller stopped waiting
        let _ = tx.send(result);
    };
    match get_pool() {
        Some(pool) => pool.spawn(job),
        None => rayon::spawn(job),
    }
    rx.await.map_err(|_| {
        EngineError::internal_panic(format!("{label}: worker dropped the result"))
    })?
}
