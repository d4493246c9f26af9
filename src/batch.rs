//! Record batching
//!
//! Pull-based grouping of a record stream into bounded batches. The batcher
//! holds at most one batch's worth of records at a time; the consumer drives
//! production, so backpressure is implicit.

use crate::error::Result;
use crate::types::Record;

/// Groups an incoming record stream into batches of at most `batch_size`.
///
/// The last batch may be shorter. The size can be adjusted between batches,
/// which the pipeline uses after the block-size estimator has seen the first
/// batch. Errors from the underlying source are passed through as-is and do
/// not end the iteration; the source decides whether it can continue.
pub struct Batcher<I> {
    source: I,
    batch_size: usize,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = Result<Record>>,
{
    /// Create a batcher producing batches of at most `batch_size` records
    pub fn new(source: I, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }

    /// Current batch size bound
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Change the bound for subsequent batches (floored at 1)
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = Result<Record>>,
{
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            match self.source.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
