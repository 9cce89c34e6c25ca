use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

use crate::row::Row;
use crate::BoxError;

/// Rows returned by a physical backend for a single sub-query.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row, BoxError>> + Send>>;

/// A stream of in-memory rows.
#[derive(Debug)]
pub struct MemoryRowStream {
    rows: VecDeque<Row>,
}

impl MemoryRowStream {
    pub fn new(rows: impl IntoIterator<Item = Row>) -> MemoryRowStream {
        MemoryRowStream {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn boxed(self) -> RowStream {
        Box::pin(self)
    }
}

impl Stream for MemoryRowStream {
    type Item = Result<Row, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.rows.pop_front().map(Ok))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}
