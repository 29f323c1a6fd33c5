use thiserror::Error;

/// `spec.md` §7 "Transport/KV": retryable (commit conflict, too-old read
/// version, future version) vs. non-retryable (txn too large, txn timed
/// out, cancelled). Retryable errors are surfaced unchanged — this layer
/// never auto-retries (`spec.md` §7, §4.9's outer retry loop).
#[derive(Debug, Error)]
pub enum KvError {
    #[error("retryable: {0}")]
    Retryable(String),
    #[error("non-retryable: {0}")]
    NonRetryable(String),
    #[error("transaction cancelled")]
    Cancelled,
    #[error("transaction timed out")]
    Timeout,
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl KvError {
    pub fn is_retryable(&self) -> bool { matches!(self, KvError::Retryable(_)) }
}
