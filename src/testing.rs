//! Test doubles shared by the unit tests.

use crate::error::RpcError;
use crate::rpc::RpcCaller;
use crate::scheduler::NextTick;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

type Handler = Box<dyn Fn(&str, &str, &[Value]) -> Result<Value, RpcError> + Send + Sync>;

/// An [`RpcCaller`] that records every call and answers from a canned
/// handler. Without a handler it replies with the first argument, which is
/// also what a batched endpoint expects: the key list comes straight back
/// as the result list.
pub(crate) struct RecordingRpc {
    log: Arc<Mutex<Vec<String>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    handler: Option<Handler>,
}

impl RecordingRpc {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub fn with_handler<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &str, &[Value]) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(handler)))
    }

    fn build(handler: Option<Handler>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            calls: Mutex::new(Vec::new()),
            handler,
        })
    }

    /// Shared step log. Call steps are pushed as `"model/method"`; tests
    /// push their own markers (loading notifications, hook invocations) to
    /// assert on combined ordering.
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        self.log.clone()
    }

    /// The `"model/method"` step of every recorded call, in order.
    pub fn steps(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(step, _)| step.clone()).collect()
    }

    /// Arguments of the `index`-th recorded call.
    pub fn args_of(&self, index: usize) -> Vec<Value> {
        self.calls.lock()[index].1.clone()
    }

    /// Arguments of the most recent call.
    pub fn last_args(&self) -> Vec<Value> {
        self.calls
            .lock()
            .last()
            .expect("no calls recorded")
            .1
            .clone()
    }
}

#[async_trait]
impl RpcCaller for RecordingRpc {
    async fn call(&self, model: &str, method: &str, args: &[Value]) -> Result<Value, RpcError> {
        let step = format!("{model}/{method}");
        self.log.lock().push(step.clone());
        self.calls.lock().push((step, args.to_vec()));
        match &self.handler {
            Some(handler) => handler(model, method, args),
            None => Ok(args.first().cloned().unwrap_or(Value::Null)),
        }
    }
}

/// A [`NextTick`] whose ticks are driven explicitly by the test, for exact
/// accumulation-window assertions.
pub(crate) struct ManualNextTick {
    queue: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl ManualNextTick {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(Vec::new()),
        })
    }

    /// Number of tasks waiting for the next tick.
    pub fn scheduled(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run everything deferred so far. Tasks deferred while the tick runs
    /// wait for the next one.
    pub async fn tick(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.queue.lock());
        for task in tasks {
            task.await;
        }
    }
}

impl NextTick for ManualNextTick {
    fn defer(&self, task: BoxFuture<'static, ()>) {
        self.queue.lock().push(task);
    }
}

/// Yield enough times for spawned background work to settle on the
/// current-thread test runtime.
pub(crate) async fn drain() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
