//! Error types for the server-data cache.

use thiserror::Error;

/// Error for invalid HTTP header configuration.
#[derive(Debug, Clone, Error)]
pub enum InvalidHeaderError {
    #[error("invalid header name: {0}")]
    InvalidName(String),
    #[error("invalid header value: {0}")]
    InvalidValue(String),
}

/// Failure propagated from an [`RpcCaller`](crate::RpcCaller).
///
/// The cache stores the error on the request's slot verbatim and re-raises
/// it on every subsequent access, which is why this type is `Clone`.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RpcError {
    /// Whether this error is transient enough for a transport-level retry.
    ///
    /// Only [`HttpRpcCaller`](crate::HttpRpcCaller) consults this; the cache
    /// itself never retries a rejected slot.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            RpcError::Timeout => true,
            RpcError::Server { code, .. } => *code >= 500,
            RpcError::Malformed(_) => false,
        }
    }

    /// Create an error from an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        RpcError::Server {
            code: i64::from(status),
            message: match status {
                400 => "bad request".to_string(),
                401 => "unauthorized".to_string(),
                403 => "forbidden".to_string(),
                404 => "not found".to_string(),
                429 => "rate limited".to_string(),
                _ if status >= 500 => format!("server error {}", status),
                _ => format!("unexpected status {}", status),
            },
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Timeout
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Malformed(err.to_string())
    }
}

/// Outcome of a synchronous cache read.
///
/// `NotReady` is the distinguished signal the evaluator matches on to render
/// a loading marker instead of an error cell. Everything else is a real RPC
/// failure replayed from the slot.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// The value is being fetched; retry after the current loading episode.
    #[error("data is still loading")]
    NotReady,

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl DataError {
    /// Whether this is the loading marker rather than a real failure.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, DataError::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RpcError::Transport("connection reset".into()).is_retryable());
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::from_status(503).is_retryable());
        assert!(!RpcError::from_status(404).is_retryable());
        assert!(!RpcError::Malformed("not json".into()).is_retryable());
    }

    #[test]
    fn not_ready_is_distinguishable() {
        assert!(DataError::NotReady.is_not_ready());
        let err: DataError = RpcError::Timeout.into();
        assert!(!err.is_not_ready());
    }
}
