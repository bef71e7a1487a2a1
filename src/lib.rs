//! Server Data Cache
//!
//! A client-side cache that bridges a synchronous evaluation engine (such
//! as a spreadsheet formula evaluator) with asynchronous remote procedure
//! calls. Synchronous reads either answer from the cache or report
//! "not yet loaded" so the evaluator can render a loading marker, while
//! the cache transparently fetches missing values, deduplicates identical
//! in-flight requests, batches compatible requests issued within one
//! scheduling tick, and retries partial batch failures key by key.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use server_data::{HttpRpcCaller, ServerData};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rpc = Arc::new(HttpRpcCaller::builder("https://api.example.com/rpc").build()?);
//!     let data = ServerData::builder(rpc)
//!         .when_data_start_loading(|| println!("loading..."))
//!         .build();
//!
//!     // Asynchronous access resolves once the call completes.
//!     let name = data.fetch("partner", "get_name", vec![json!(5)]).await?;
//!     println!("fetched: {name}");
//!
//!     // Synchronous access answers from the cache or reports NotReady.
//!     match data.get("partner", "get_name", vec![json!(5)]) {
//!         Ok(name) => println!("cached: {name}"),
//!         Err(err) if err.is_not_ready() => println!("still loading"),
//!         Err(err) => eprintln!("rpc failed: {err}"),
//!     }
//!
//!     // Batched access: keys requested in the same tick share one call.
//!     let _ = data.batch().get("partner", "get_names", 5);
//!     let _ = data.batch().get("partner", "get_names", 6);
//!
//!     Ok(())
//! }
//! ```

mod batch;
mod cache;
mod endpoint;
mod error;
mod request;
mod retry;
mod rpc;
mod scheduler;
mod server_data;
mod single;
#[cfg(test)]
mod testing;

pub use batch::{BatchHooks, RequestCallback};
pub use cache::LoadingCallback;
pub use error::{DataError, InvalidHeaderError, RpcError};
pub use request::{Fingerprint, Request};
pub use retry::{JitterMode, RetryConfig};
pub use rpc::{HttpRpcCaller, HttpRpcCallerBuilder, RpcCaller};
pub use scheduler::{NextTick, TokioNextTick};
pub use server_data::{Batch, ServerData, ServerDataBuilder};
