/// Tunables for [`crate::OnlineIndexer`] and [`crate::Scrubber`]
/// (`spec.md` §4.9/§4.10). Defaults match the values named in the spec.
#[derive(Debug, Clone, Copy)]
pub struct IndexerConfig {
    /// Max primary keys (or index entries) touched per transaction.
    pub batch_size: usize,
    /// Sleep between worker-loop transactions, for backpressure.
    pub throttle_delay_ms: u64,
    /// Retries (with exponential backoff) for a retryable KV error before
    /// the range is recorded in the failure log and skipped.
    pub max_retries: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self { Self { batch_size: 100, throttle_delay_ms: 10, max_retries: 5 } }
}
