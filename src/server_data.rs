//! Façade over the cache and its access paths.

use crate::batch::{BatchEndpoint, BatchHooks};
use crate::cache::{LoadingCallback, RequestCache};
use crate::endpoint::Endpoint;
use crate::error::{DataError, RpcError};
use crate::request::Request;
use crate::rpc::RpcCaller;
use crate::scheduler::{NextTick, TokioNextTick};
use crate::single::SingleEndpoint;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Client-side cache of server values for a synchronous evaluator.
///
/// Values are addressed as `(model, method, args)` invocations. The
/// synchronous [`get`](Self::get) either answers from the cache or reports
/// [`DataError::NotReady`] while a background fetch fills the slot;
/// [`fetch`](Self::fetch) awaits the value; [`batch`](Self::batch)
/// accumulates per-`(model, method)` keys issued in the same scheduling
/// tick into one combined call.
///
/// Entries live for the process lifetime: there is no eviction and no
/// invalidation. A host that needs fresh data creates a new `ServerData`.
pub struct ServerData {
    cache: Arc<RequestCache>,
    single: SingleEndpoint,
    rpc: Arc<dyn RpcCaller>,
    scheduler: Arc<dyn NextTick>,
    batch_endpoints: Mutex<HashMap<(String, String), BatchEndpoint>>,
    batch_hooks: HashMap<(String, String), BatchHooks>,
}

impl std::fmt::Debug for ServerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerData")
            .field("pending", &self.cache.pending_count())
            .field("batch_endpoints", &self.batch_endpoints.lock().len())
            .finish()
    }
}

impl ServerData {
    /// Create a cache with default settings.
    pub fn new(rpc: Arc<dyn RpcCaller>) -> Self {
        Self::builder(rpc).build()
    }

    /// Create a builder for customization.
    pub fn builder(rpc: Arc<dyn RpcCaller>) -> ServerDataBuilder {
        ServerDataBuilder::new(rpc)
    }

    /// Await the value of one invocation.
    ///
    /// Concurrent identical fetches share a single RPC; once a slot is
    /// terminal its outcome is replayed without another call. A stored
    /// failure is re-raised verbatim on every subsequent fetch.
    pub async fn fetch(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        self.single.fetch(Request::new(model, method, args)).await
    }

    /// Synchronous read for the evaluator. Never suspends.
    ///
    /// Missing values are handed to a background fetch (which requires a
    /// running tokio runtime) and reported as [`DataError::NotReady`];
    /// stored failures are replayed as [`DataError::Rpc`].
    pub fn get(&self, model: &str, method: &str, args: Vec<Value>) -> Result<Value, DataError> {
        self.single.synchronous_get(&Request::new(model, method, args))
    }

    /// Access the batched read path.
    pub fn batch(&self) -> Batch<'_> {
        Batch { data: self }
    }

    /// Whether any request is currently loading.
    pub fn is_loading(&self) -> bool {
        self.cache.pending_count() > 0
    }

    fn batch_endpoint(&self, model: &str, method: &str) -> BatchEndpoint {
        let key = (model.to_string(), method.to_string());
        let mut endpoints = self.batch_endpoints.lock();
        if let Some(endpoint) = endpoints.get(&key) {
            return endpoint.clone();
        }
        let hooks = self.batch_hooks.get(&key).cloned().unwrap_or_default();
        let endpoint = BatchEndpoint::new(
            model,
            method,
            self.cache.clone(),
            self.rpc.clone(),
            self.scheduler.clone(),
            hooks,
        );
        endpoints.insert(key, endpoint.clone());
        endpoint
    }
}

/// Batched read path of a [`ServerData`].
///
/// `get(model, method, key)` is the synchronous contract of
/// [`ServerData::get`] with `args = [key]`, routed through the
/// `(model, method)` batch endpoint: every key that misses the cache
/// within one scheduling tick joins a single combined call.
#[derive(Clone, Copy)]
pub struct Batch<'a> {
    data: &'a ServerData,
}

impl Batch<'_> {
    pub fn get(
        &self,
        model: &str,
        method: &str,
        key: impl Into<Value>,
    ) -> Result<Value, DataError> {
        let request = Request::new(model, method, vec![key.into()]);
        self.data
            .batch_endpoint(model, method)
            .synchronous_get(&request)
    }
}

/// Builder for configuring a [`ServerData`].
#[must_use = "builders do nothing unless you call .build()"]
pub struct ServerDataBuilder {
    rpc: Arc<dyn RpcCaller>,
    scheduler: Arc<dyn NextTick>,
    when_data_start_loading: Option<LoadingCallback>,
    batch_hooks: HashMap<(String, String), BatchHooks>,
}

impl ServerDataBuilder {
    fn new(rpc: Arc<dyn RpcCaller>) -> Self {
        Self {
            rpc,
            scheduler: Arc::new(TokioNextTick),
            when_data_start_loading: None,
            batch_hooks: HashMap::new(),
        }
    }

    /// Notify the host when a loading episode begins.
    ///
    /// The callback fires when a request goes pending while nothing else
    /// is loading, and again only after everything in flight has settled.
    /// It is advisory, intended for a loading indicator.
    pub fn when_data_start_loading<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.when_data_start_loading = Some(Arc::new(callback));
        self
    }

    /// Replace the next-tick primitive that closes batch accumulation
    /// windows. Defaults to the tokio trampoline.
    pub fn scheduler(mut self, scheduler: Arc<dyn NextTick>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Attach per-request observability hooks to one batched endpoint.
    pub fn batch_hooks(
        mut self,
        model: impl Into<String>,
        method: impl Into<String>,
        hooks: BatchHooks,
    ) -> Self {
        self.batch_hooks.insert((model.into(), method.into()), hooks);
        self
    }

    /// Build the cache.
    pub fn build(self) -> ServerData {
        let cache = Arc::new(RequestCache::new(self.when_data_start_loading));
        let single = SingleEndpoint::new(cache.clone(), self.rpc.clone());
        ServerData {
            cache,
            single,
            rpc: self.rpc,
            scheduler: self.scheduler,
            batch_endpoints: Mutex::new(HashMap::new()),
            batch_hooks: self.batch_hooks,
        }
    }
}
