use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;

use crate::filter::Filter;
use crate::record::Record;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("record decode failed: {0}")]
    Decode(String),
    #[error("cursor cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// `spec.md` §4.7 "All cursors are lazy": one record at a time,
/// back-pressured by the caller, cancellable between records. Grounded on
/// `storage/common/src/filtering.rs`'s `ValueSetStream`/`FilteredStream`
/// combinator shape, generalized from `Filterable` property-value streams
/// to decoded `Record`s.
pub trait RecordCursor: Stream<Item = Result<Record, QueryError>> + Unpin + Send {
    fn filter_predicate(self, filter: Filter) -> FilteredCursor<Self>
    where Self: Sized {
        FilteredCursor { inner: self, filter }
    }

    fn take_limit(self, limit: Option<u64>) -> LimitedCursor<Self>
    where Self: Sized {
        LimitedCursor { inner: self, remaining: limit, done: false }
    }
}

impl<S> RecordCursor for S where S: Stream<Item = Result<Record, QueryError>> + Unpin + Send {}

/// Drops records the filter rejects; evaluates repeated-field comparisons
/// under ANY-semantics via `Filter::matches` (`spec.md` §4.7 `FilterPlan`).
pub struct FilteredCursor<I> {
    inner: I,
    filter: Filter,
}

impl<S: Unpin> Unpin for FilteredCursor<S> {}

impl<S: Stream<Item = Result<Record, QueryError>> + Unpin> Stream for FilteredCursor<S> {
    type Item = Result<Record, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(record))) => {
                    if self.filter.matches(&record) {
                        return Poll::Ready(Some(Ok(record)));
                    }
                    continue;
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Early-termination signal propagating from the outermost operator
/// inward (`spec.md` §4.7): once `remaining` hits zero the cursor stops
/// polling its inner stream entirely.
pub struct LimitedCursor<I> {
    inner: I,
    remaining: Option<u64>,
    done: bool,
}

impl<S: Unpin> Unpin for LimitedCursor<S> {}

impl<S: Stream<Item = Result<Record, QueryError>> + Unpin> Stream for LimitedCursor<S> {
    type Item = Result<Record, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        if let Some(0) = self.remaining {
            self.done = true;
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                Poll::Ready(Some(item))
            }
            other => {
                if matches!(other, Poll::Ready(None)) {
                    self.done = true;
                }
                other
            }
        }
    }
}
