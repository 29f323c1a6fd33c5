/// Tunables named in `spec.md` §4.6, gathered into one programmatic
/// config struct the way `ankurah-core`'s connectors take constructor
/// options rather than reading environment variables directly.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Step 2: skip DNF conversion if the estimated term count exceeds this.
    pub max_dnf_terms: usize,
    /// Step 2: cap on rewrite recursion depth.
    pub max_depth: usize,
    /// Step 3: cap on the number of candidate plans considered.
    pub max_candidate_plans: usize,
    /// Step 4: histogram bucket count per index.
    pub bucket_count: usize,
    /// Plan cache capacity (LRU eviction beyond this).
    pub cache_capacity: usize,
    /// Plan cache entry time-to-live, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_dnf_terms: 100, max_depth: 20, max_candidate_plans: 20, bucket_count: 32, cache_capacity: 1000, cache_ttl_secs: 60 }
    }
}
