use recordlayer_query::Filter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self { Self { field: field.into(), descending: false } }
    pub fn desc(field: impl Into<String>) -> Self { Self { field: field.into(), descending: true } }
}

/// The planner's input: `spec.md` §4.6 step 1's `(filter canonical form,
/// sort, limit)` fingerprint inputs, plus the record type the filter is
/// evaluated against (which index candidates are even eligible).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub record_type: String,
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(record_type: impl Into<String>, filter: Filter) -> Self { Self { record_type: record_type.into(), filter, sort: Vec::new(), limit: None } }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
