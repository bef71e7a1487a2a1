//! RPC invocation boundary and the HTTP binding.

use crate::error::{InvalidHeaderError, RpcError};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Remote procedure invocation consumed by the cache.
///
/// Errors are treated opaquely: whatever `call` returns is stored on the
/// request's slot and re-raised verbatim on later reads. Retries,
/// timeouts and authentication are the caller's concern.
#[async_trait]
pub trait RpcCaller: Send + Sync {
    /// Invoke `method` on `model` with positional `args`.
    async fn call(&self, model: &str, method: &str, args: &[Value]) -> Result<Value, RpcError>;
}

#[derive(Serialize)]
struct CallPayload<'a> {
    model: &'a str,
    method: &'a str,
    args: &'a [Value],
}

#[derive(Deserialize)]
struct CallReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<CallFault>,
}

#[derive(Deserialize)]
struct CallFault {
    #[serde(default)]
    code: i64,
    message: String,
}

/// [`RpcCaller`] that posts `{model, method, args}` as JSON to a fixed
/// endpoint and reads back `{"result": ...}` or `{"error": {...}}`.
///
/// Transient failures (network errors, timeouts, 5xx) are retried with
/// backoff and jitter per the configured [`RetryConfig`]; everything else
/// surfaces immediately.
#[derive(Clone)]
pub struct HttpRpcCaller {
    http: reqwest::Client,
    endpoint: String,
    default_headers: HeaderMap,
    header_provider: Option<Arc<dyn Fn() -> HeaderMap + Send + Sync>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for HttpRpcCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRpcCaller")
            .field("endpoint", &self.endpoint)
            .field("default_headers", &self.default_headers)
            .field("has_header_provider", &self.header_provider.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpRpcCaller {
    /// Create a builder targeting `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> HttpRpcCallerBuilder {
        HttpRpcCallerBuilder::new(endpoint)
    }

    /// Headers for one call, including dynamic headers if configured.
    fn headers(&self) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        if let Some(provider) = &self.header_provider {
            for (key, value) in provider().iter() {
                headers.insert(key.clone(), value.clone());
            }
        }
        headers
    }

    async fn send(&self, payload: &CallPayload<'_>) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .headers(self.headers())
            .json(payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(RpcError::from_status(status));
        }

        let reply: CallReply = resp
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;
        match reply.error {
            Some(fault) => Err(RpcError::Server {
                code: fault.code,
                message: fault.message,
            }),
            None => Ok(reply.result.unwrap_or(Value::Null)),
        }
    }
}

#[async_trait]
impl RpcCaller for HttpRpcCaller {
    async fn call(&self, model: &str, method: &str, args: &[Value]) -> Result<Value, RpcError> {
        let payload = CallPayload {
            model,
            method,
            args,
        };
        let mut attempt = 0;
        let mut delay = Duration::ZERO;
        loop {
            match self.send(&payload).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    delay = self.retry.next_backoff(attempt, delay);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        model,
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying rpc call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Builder for configuring an [`HttpRpcCaller`].
#[must_use = "builders do nothing unless you call .build()"]
pub struct HttpRpcCallerBuilder {
    endpoint: String,
    default_headers: HeaderMap,
    header_provider: Option<Arc<dyn Fn() -> HeaderMap + Send + Sync>>,
    timeout: Option<Duration>,
    retry: RetryConfig,
}

impl HttpRpcCallerBuilder {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            default_headers: HeaderMap::new(),
            header_provider: None,
            timeout: None,
            retry: RetryConfig::default(),
        }
    }

    /// Add a default header for all calls.
    ///
    /// Invalid header names or values are silently ignored. Use
    /// [`try_default_header`](Self::try_default_header) if you need error
    /// handling.
    pub fn default_header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            reqwest::header::HeaderName::from_bytes(key.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            self.default_headers.insert(name, val);
        }
        self
    }

    /// Add a default header, failing on an invalid name or value.
    pub fn try_default_header(mut self, key: &str, value: &str) -> Result<Self, InvalidHeaderError> {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| InvalidHeaderError::InvalidName(key.to_string()))?;
        let val = reqwest::header::HeaderValue::from_str(value)
            .map_err(|_| InvalidHeaderError::InvalidValue(value.to_string()))?;
        self.default_headers.insert(name, val);
        Ok(self)
    }

    /// Set a dynamic header provider (called per call, e.g. for rotating
    /// auth tokens).
    pub fn header_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HeaderMap + Send + Sync + 'static,
    {
        self.header_provider = Some(Arc::new(provider));
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy for transient failures.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build the caller.
    ///
    /// Returns an error if the underlying HTTP client fails to build
    /// (e.g., TLS configuration issues).
    pub fn build(self) -> Result<HttpRpcCaller, RpcError> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(RpcError::from)?;

        Ok(HttpRpcCaller {
            http,
            endpoint: self.endpoint,
            default_headers: self.default_headers,
            header_provider: self.header_provider,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_wire_shape() {
        let args = vec![json!(5), json!({"fields": ["name"]})];
        let payload = CallPayload {
            model: "partner",
            method: "read",
            args: &args,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"model": "partner", "method": "read", "args": [5, {"fields": ["name"]}]})
        );
    }

    #[test]
    fn reply_wire_shapes() {
        let ok: CallReply = serde_json::from_str(r#"{"result": 42}"#).unwrap();
        assert_eq!(ok.result, Some(json!(42)));
        assert!(ok.error.is_none());

        // A null result is a legitimate value.
        let null: CallReply = serde_json::from_str(r#"{"result": null}"#).unwrap();
        assert_eq!(null.result.unwrap_or(Value::Null), Value::Null);

        let failed: CallReply =
            serde_json::from_str(r#"{"error": {"code": 404, "message": "no such record"}}"#)
                .unwrap();
        let fault = failed.error.unwrap();
        assert_eq!(fault.code, 404);
        assert_eq!(fault.message, "no such record");
    }

    #[test]
    fn builder_rejects_bad_headers_only_when_asked() {
        let permissive = HttpRpcCaller::builder("http://localhost/rpc")
            .default_header("bad\nname", "v")
            .build()
            .unwrap();
        assert!(permissive.default_headers.is_empty());

        assert!(HttpRpcCaller::builder("http://localhost/rpc")
            .try_default_header("bad\nname", "v")
            .is_err());
        let strict = HttpRpcCaller::builder("http://localhost/rpc")
            .try_default_header("x-api-key", "secret")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(strict.default_headers.len(), 1);
    }
}
