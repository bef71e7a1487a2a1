//! Single-request endpoint.

use crate::cache::{Claim, RequestCache, SlotReceiver};
use crate::endpoint::Endpoint;
use crate::error::RpcError;
use crate::request::{Fingerprint, Request};
use crate::rpc::RpcCaller;
use serde_json::Value;
use std::sync::Arc;

/// Drives one request at a time through the [`RpcCaller`], writing the
/// outcome into the shared cache and fulfilling awaiters.
///
/// Cloning is shallow; clones share the cache and the caller.
#[derive(Clone)]
pub(crate) struct SingleEndpoint {
    cache: Arc<RequestCache>,
    rpc: Arc<dyn RpcCaller>,
}

impl SingleEndpoint {
    pub fn new(cache: Arc<RequestCache>, rpc: Arc<dyn RpcCaller>) -> Self {
        Self { cache, rpc }
    }

    /// Fetch the request's value, deduplicating against in-flight work.
    ///
    /// Terminal slots answer immediately. A slot already driven by this
    /// path attaches a waiter instead of issuing a second call. A pending
    /// slot that originated in a batch accumulator gets its own concurrent
    /// call: the batch flush has not happened yet, and the two outcomes
    /// race for the slot with the first one winning.
    pub async fn fetch(&self, request: Request) -> Result<Value, RpcError> {
        let fp = request.fingerprint();
        match self.cache.claim_for_single(&fp) {
            Claim::Ready(outcome) => outcome,
            Claim::Wait(rx) => await_slot(rx).await,
            Claim::Issue | Claim::DuplicateIssue => self.drive(request, fp).await,
        }
    }

    async fn drive(&self, request: Request, fp: Fingerprint) -> Result<Value, RpcError> {
        let outcome = self
            .rpc
            .call(request.model(), request.method(), request.args())
            .await;
        match &outcome {
            Ok(value) => self.cache.resolve(&fp, value.clone()),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(request = %request, error = %err, "request rejected");
                self.cache.reject(&fp, err.clone());
            }
        }
        outcome
    }
}

impl Endpoint for SingleEndpoint {
    fn cache(&self) -> &RequestCache {
        &self.cache
    }

    fn submit(&self, request: Request) {
        // Claim synchronously so the slot is pending (and the loading
        // episode has started) before the caller observes NotReady; only
        // the RPC itself runs in the background.
        let fp = request.fingerprint();
        match self.cache.claim_for_single(&fp) {
            Claim::Issue | Claim::DuplicateIssue => {
                let this = self.clone();
                tokio::spawn(async move {
                    let _ = this.drive(request, fp).await;
                });
            }
            // Already driven or terminal; the outcome lands (or landed)
            // in the cache without our help.
            Claim::Wait(_) | Claim::Ready(_) => {}
        }
    }
}

async fn await_slot(rx: SlotReceiver) -> Result<Value, RpcError> {
    rx.await
        .unwrap_or_else(|_| Err(RpcError::Transport("request abandoned".into())))
}
