//! Capability shared by the single and batched access paths.

use crate::cache::{Lookup, RequestCache};
use crate::error::DataError;
use crate::request::Request;
use serde_json::Value;

/// An access path that drives requests to completion in the background and
/// answers for them synchronously.
///
/// The single and batched endpoints differ only in how a missing request
/// is handed to the background machinery, so the synchronous contract
/// lives here as a provided method.
pub(crate) trait Endpoint {
    fn cache(&self) -> &RequestCache;

    /// Hand a request to the background machinery, fire-and-forget. The
    /// outcome lands in the cache.
    fn submit(&self, request: Request);

    /// Synchronous read. Resolved slots answer immediately, rejected slots
    /// replay their stored error, and anything still loading raises
    /// [`DataError::NotReady`]. Missing requests are submitted first, then
    /// reported as not ready.
    fn synchronous_get(&self, request: &Request) -> Result<Value, DataError> {
        match self.cache().lookup(&request.fingerprint()) {
            Lookup::Resolved(value) => Ok(value),
            Lookup::Rejected(err) => Err(DataError::Rpc(err)),
            Lookup::Pending => Err(DataError::NotReady),
            Lookup::Absent => {
                self.submit(request.clone());
                Err(DataError::NotReady)
            }
        }
    }
}
