//! Per-`(model, method)` batching endpoint.

use crate::cache::RequestCache;
use crate::endpoint::Endpoint;
use crate::error::RpcError;
use crate::request::Request;
use crate::rpc::RpcCaller;
use crate::scheduler::NextTick;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Per-request observability callback.
pub type RequestCallback = Arc<dyn Fn(&Request) + Send + Sync>;

/// Observability hooks for a batched endpoint.
///
/// `on_success` runs after a request's slot resolves, `on_failure` after
/// it rejects. In a successful batch the success hook runs once per
/// request in accumulator order; in the fallback path each request's hook
/// matches its individual outcome.
#[derive(Clone, Default)]
pub struct BatchHooks {
    pub(crate) on_success: Option<RequestCallback>,
    pub(crate) on_failure: Option<RequestCallback>,
}

impl BatchHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }
}

struct BatchState {
    queue: Vec<Request>,
    flush_scheduled: bool,
}

/// Batching coordinator for one `(model, method)` pair.
///
/// Requests enqueued within one scheduling tick are sent as a single RPC
/// whose argument is the list of their batching keys (each request's first
/// positional argument). The reply is split positionally back onto the
/// individual slots. If the combined call fails as a whole, every request
/// is retried one-by-one, sequentially and in accumulator order, so that a
/// single poisonous key only rejects its own slot.
///
/// Cloning is shallow; clones share the accumulator, cache and caller.
#[derive(Clone)]
pub(crate) struct BatchEndpoint {
    model: String,
    method: String,
    cache: Arc<RequestCache>,
    rpc: Arc<dyn RpcCaller>,
    scheduler: Arc<dyn NextTick>,
    hooks: Arc<BatchHooks>,
    state: Arc<Mutex<BatchState>>,
}

impl BatchEndpoint {
    pub fn new(
        model: impl Into<String>,
        method: impl Into<String>,
        cache: Arc<RequestCache>,
        rpc: Arc<dyn RpcCaller>,
        scheduler: Arc<dyn NextTick>,
        hooks: BatchHooks,
    ) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            cache,
            rpc,
            scheduler,
            hooks: Arc::new(hooks),
            state: Arc::new(Mutex::new(BatchState {
                queue: Vec::new(),
                flush_scheduled: false,
            })),
        }
    }

    /// Add a request to the next flush.
    ///
    /// A fingerprint that already has a slot is left alone: its state is
    /// answered by the synchronous contract, and accumulating it again
    /// would issue a duplicate batched call.
    pub fn enqueue(&self, request: Request) {
        if !self.cache.insert_pending(request.fingerprint()) {
            return;
        }
        let schedule = {
            let mut state = self.state.lock();
            state.queue.push(request);
            if state.flush_scheduled {
                false
            } else {
                state.flush_scheduled = true;
                true
            }
        };
        if schedule {
            let this = self.clone();
            self.scheduler.defer(Box::pin(async move { this.flush().await }));
        }
    }

    /// Send the accumulated requests as one combined call.
    ///
    /// Requests enqueued while the flush is in flight land in a fresh
    /// accumulator and get their own tick.
    async fn flush(self) {
        let batch = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            std::mem::take(&mut state.queue)
        };
        if batch.is_empty() {
            return;
        }

        let keys: Vec<Value> = batch.iter().map(key_of).collect();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            model = %self.model,
            method = %self.method,
            size = batch.len(),
            "flushing batch"
        );

        let args = vec![Value::Array(keys)];
        match self.rpc.call(&self.model, &self.method, &args).await {
            Ok(reply) => match split_reply(reply, batch.len()) {
                Some(results) => {
                    for (request, result) in batch.iter().zip(results) {
                        self.cache.resolve(&request.fingerprint(), result);
                        self.notify(&self.hooks.on_success, request);
                    }
                }
                // A reply that does not line up with the keys counts as a
                // batch-level failure.
                None => self.retry_one_by_one(&batch).await,
            },
            Err(_) => self.retry_one_by_one(&batch).await,
        }
    }

    /// Fallback after a whole-batch failure: one single-key call per
    /// request, strictly sequential, preserving accumulator order.
    async fn retry_one_by_one(&self, batch: &[Request]) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            model = %self.model,
            method = %self.method,
            size = batch.len(),
            "batch failed, retrying one by one"
        );
        for request in batch {
            let fp = request.fingerprint();
            let args = vec![Value::Array(vec![key_of(request)])];
            match self.rpc.call(&self.model, &self.method, &args).await {
                Ok(reply) => match split_reply(reply, 1) {
                    Some(mut results) => {
                        self.cache.resolve(&fp, results.remove(0));
                        self.notify(&self.hooks.on_success, request);
                    }
                    None => {
                        self.cache.reject(
                            &fp,
                            RpcError::Malformed("single-key reply was not a one-element list".into()),
                        );
                        self.notify(&self.hooks.on_failure, request);
                    }
                },
                Err(err) => {
                    self.cache.reject(&fp, err);
                    self.notify(&self.hooks.on_failure, request);
                }
            }
        }
    }

    fn notify(&self, hook: &Option<RequestCallback>, request: &Request) {
        if let Some(callback) = hook {
            callback(request);
        }
    }
}

impl Endpoint for BatchEndpoint {
    fn cache(&self) -> &RequestCache {
        &self.cache
    }

    fn submit(&self, request: Request) {
        self.enqueue(request);
    }
}

fn key_of(request: &Request) -> Value {
    request.batch_key().cloned().unwrap_or(Value::Null)
}

/// A combined reply must be a list aligned positionally with the keys.
fn split_reply(reply: Value, expected: usize) -> Option<Vec<Value>> {
    match reply {
        Value::Array(items) if items.len() == expected => Some(items),
        _ => None,
    }
}
