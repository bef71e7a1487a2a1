//! Deferral of batch flushes to the next scheduler tick.

use futures::future::BoxFuture;

/// The host's "next tick" primitive.
///
/// A deferred task runs after the current synchronous region drains,
/// before further I/O completions are delivered. Batch endpoints use this
/// boundary to close their accumulation window: every request enqueued
/// before the tick joins the flush, everything after it joins the next
/// one.
pub trait NextTick: Send + Sync {
    /// Enqueue `task` to run at the next tick.
    fn defer(&self, task: BoxFuture<'static, ()>);
}

/// Next-tick trampoline backed by the tokio executor.
///
/// On a current-thread runtime the spawned task runs once the spawning
/// region yields, which matches the accumulation window exactly. On a
/// multi-threaded runtime another worker may pick the flush up as soon as
/// it is spawned, so the window is best-effort there.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioNextTick;

impl NextTick for TokioNextTick {
    fn defer(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}
