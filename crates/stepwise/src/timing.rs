//! Timing middleware for collaborator calls.
//!
//! Wrap an operation explicitly at the call site instead of annotating it:
//!
//! ```ignore
//! let output = timed("decide", decider.decide(snapshot)).await;
//! let trimmed = timed_sync("trim", || history.trim_to_budget(max, &sizer));
//! ```
//!
//! Elapsed time is logged at debug level under the given label.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

/// Await `fut` and log how long it took.
pub async fn timed<F>(label: &str, fut: F) -> F::Output
where
    F: Future,
{
    let start = Instant::now();
    let output = fut.await;
    log_elapsed(label, start.elapsed());
    output
}

/// Run `f` and log how long it took.
pub fn timed_sync<T>(label: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let output = f();
    log_elapsed(label, start.elapsed());
    output
}

fn log_elapsed(label: &str, elapsed: Duration) {
    debug!("{label} execution time: {:.2}s", elapsed.as_secs_f64());
}
