//! Block size estimation
//!
//! Projects how many rows fit in a target block byte budget by encoding a
//! small sample once and measuring its serialized size. The estimate is
//! computed once per write session; row sizes that drift far from the
//! sample will make later blocks run over or under the budget, which is an
//! accepted tradeoff of not re-estimating per block.

use crate::error::Result;
use crate::schema::{infer_schema, records_to_batch};
use crate::types::{Codec, Record};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

/// Fallback when no sample is available to measure
pub const DEFAULT_ROWS_PER_BLOCK: usize = 1_024;

/// Estimate rows per block for a target block byte budget.
///
/// Encodes `sample` into an in-memory Parquet buffer with the session codec
/// and derives `floor(budget / avg_bytes_per_record)`, floored at 1 so a
/// budget smaller than a single record still makes progress. An empty
/// sample falls back to [`DEFAULT_ROWS_PER_BLOCK`].
pub fn rows_per_block(sample: &[Record], budget_bytes: usize, codec: Codec) -> Result<usize> {
    if sample.is_empty() {
        return Ok(DEFAULT_ROWS_PER_BLOCK);
    }

    let encoded_len = encoded_sample_len(sample, codec)?;
    if encoded_len == 0 {
        return Ok(DEFAULT_ROWS_PER_BLOCK);
    }

    // floor(budget / (encoded_len / rows)) without going through floats
    let rows = budget_bytes.saturating_mul(sample.len()) / encoded_len;
    Ok(rows.max(1))
}

/// Serialize the sample through a throwaway writer and measure the bytes
fn encoded_sample_len(sample: &[Record], codec: Codec) -> Result<usize> {
    let schema = infer_schema(sample)?;
    let batch = records_to_batch(sample, &schema)?;

    let props = WriterProperties::builder()
        .set_compression(codec.to_parquet())
        .build();
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props))?;
    writer.write(&batch)?;
    let buffer = writer.into_inner()?;

    Ok(buffer.len())
}
