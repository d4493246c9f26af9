//! Streaming block writer
//!
//! [`StreamingBlockWriter`] sequences batches of records into one Parquet
//! stream: each batch becomes an independently decodable row group whose
//! bytes are forwarded straight to a [`PartUploadSession`], so the whole
//! file never sits in memory. Schema is inferred from the first batch and
//! enforced field-by-field on every later one; the footer is written at
//! `finish`, which also commits the upload session, so the object becomes
//! visible only then.

use crate::error::{Error, Result};
use crate::schema::{check_schema, infer_schema, records_to_batch};
use crate::types::{Codec, Record, WriteSummary};
use crate::upload::{CommitReceipt, ObjectTransport, PartUploadSession};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Shared buffer
// ============================================================================

/// An in-memory `Write` target the ArrowWriter and the upload path share.
///
/// The ArrowWriter owns one clone and appends encoded bytes; the block
/// writer drains the other clone after every row-group flush and forwards
/// the drained bytes to the upload session.
#[derive(Clone, Default)]
struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Take everything written since the last drain
    fn drain(&self) -> Result<Bytes> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::encoding("shared buffer lock poisoned"))?;
        Ok(Bytes::from(std::mem::take(&mut *inner)))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::Other, "shared buffer lock poisoned")
            })?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Encoded block
// ============================================================================

/// Statistics for one encoded block (Parquet row group)
#[derive(Debug, Clone, Copy)]
pub struct EncodedBlock {
    /// Rows in this block, always > 0
    pub row_count: u64,
    /// Encoded size of this block's row group in bytes.
    ///
    /// Measured at the ArrowWriter, not at the sink: the writer buffers
    /// internally, so the bytes may reach the upload session on a later
    /// drain.
    pub byte_len: usize,
}

// ============================================================================
// Writer state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Unopened,
    Writing,
    Finalized,
    Closed,
    Aborted,
}

/// Writes batches of records as row groups into one uploaded Parquet object.
///
/// Lifecycle: `start` → `write_block`* → `finish` → `close`, with `abort`
/// as the escape hatch from the writing state. Calling `close` while still
/// writing is an error, never a silent finalize: a truncated file must not
/// look intentional.
pub struct StreamingBlockWriter<T: ObjectTransport> {
    session: PartUploadSession<T>,
    codec: Codec,
    buffer: SharedBuffer,
    writer: Option<ArrowWriter<SharedBuffer>>,
    schema: Option<Arc<Schema>>,
    state: WriterState,
    row_count: u64,
    block_count: u64,
    byte_size: u64,
    started_at: Option<Instant>,
}

impl<T: ObjectTransport> StreamingBlockWriter<T> {
    /// Create a writer streaming into the given upload session
    pub fn new(session: PartUploadSession<T>, codec: Codec) -> Self {
        Self {
            session,
            codec,
            buffer: SharedBuffer::default(),
            writer: None,
            schema: None,
            state: WriterState::Unopened,
            row_count: 0,
            block_count: 0,
            byte_size: 0,
            started_at: None,
        }
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.row_count
    }

    /// Blocks written so far
    pub fn blocks_written(&self) -> u64 {
        self.block_count
    }

    /// Bytes forwarded to the upload session so far
    pub fn bytes_forwarded(&self) -> u64 {
        self.byte_size
    }

    /// Begin a write session. Fails if called twice.
    pub fn start(&mut self) -> Result<()> {
        if self.state != WriterState::Unopened {
            return Err(Error::protocol("writer already started"));
        }
        self.state = WriterState::Writing;
        self.started_at = Some(Instant::now());
        debug!(codec = %self.codec, "started streaming block writer");
        Ok(())
    }

    /// Encode one batch as a row group and forward its bytes to the sink.
    ///
    /// The first batch establishes the schema; later batches must match it
    /// structurally. Validation happens before the batch touches the
    /// ArrowWriter, so a schema failure leaves the stream writable. A
    /// failure while encoding or forwarding may leave bytes unaccounted
    /// for, so it aborts the upload session and moves the writer to the
    /// aborted state; `finish` then refuses rather than committing a
    /// truncated object. Empty batches are skipped and return `None`.
    pub async fn write_block(&mut self, records: &[Record]) -> Result<Option<EncodedBlock>> {
        if self.state != WriterState::Writing {
            return Err(Error::protocol("write_block outside the writing state"));
        }

        if records.is_empty() {
            warn!("received an empty batch, skipping");
            return Ok(None);
        }

        let batch_schema = infer_schema(records)?;
        let schema = match &self.schema {
            Some(established) => {
                check_schema(established, &batch_schema)?;
                Arc::clone(established)
            }
            None => {
                let established = Arc::new(batch_schema);
                let props = WriterProperties::builder()
                    .set_compression(self.codec.to_parquet())
                    .build();
                self.writer = Some(ArrowWriter::try_new(
                    self.buffer.clone(),
                    Arc::clone(&established),
                    Some(props),
                )?);
                debug!(fields = established.fields().len(), "established stream schema");
                self.schema = Some(Arc::clone(&established));
                established
            }
        };

        let batch = records_to_batch(records, &schema)?;

        let byte_len = match self.encode_and_forward(&batch).await {
            Ok(byte_len) => byte_len,
            Err(err) => {
                self.poison().await;
                return Err(err);
            }
        };

        let block = EncodedBlock {
            row_count: records.len() as u64,
            byte_len,
        };
        self.row_count += block.row_count;
        self.block_count += 1;
        debug!(
            block = self.block_count,
            rows = block.row_count,
            bytes = block.byte_len,
            "wrote block"
        );

        Ok(Some(block))
    }

    /// Push one batch through the ArrowWriter and forward the drained bytes.
    /// Returns the encoded size of the resulting row group.
    async fn encode_and_forward(&mut self, batch: &RecordBatch) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::protocol("writer missing in writing state"))?;
        let before = writer.bytes_written();
        writer.write(batch)?;
        // End the row group so this batch is an independently decodable block
        writer.flush()?;
        let byte_len = writer.bytes_written() - before;

        let bytes = self.buffer.drain()?;
        self.session.write(&bytes).await?;
        self.byte_size += bytes.len() as u64;
        Ok(byte_len)
    }

    /// The stream may hold bytes the sink never saw. Abort the session and
    /// latch the aborted state so `finish` cannot commit a truncated object.
    async fn poison(&mut self) {
        self.writer = None;
        if let Err(err) = self.session.abort().await {
            warn!(error = %err, "failed to abort the upload session after a write failure");
        }
        self.state = WriterState::Aborted;
    }

    /// Write the footer, commit the upload, and return the final summary.
    ///
    /// Fails with [`Error::EmptyStream`] if no blocks were ever written; in
    /// that case the upload session is aborted so nothing becomes visible.
    pub async fn finish(&mut self) -> Result<WriteSummary> {
        if self.state != WriterState::Writing {
            return Err(Error::protocol("finish outside the writing state"));
        }

        if self.block_count == 0 {
            self.writer = None;
            self.session.abort().await?;
            self.state = WriterState::Aborted;
            return Err(Error::EmptyStream);
        }

        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::protocol("writer missing in writing state"))?;
        let receipt = match self.finalize(writer).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.poison().await;
                return Err(err);
            }
        };
        self.state = WriterState::Finalized;

        let elapsed = self
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let summary = WriteSummary {
            row_count: self.row_count,
            block_count: self.block_count,
            byte_size: self.byte_size,
            codec: self.codec,
            elapsed,
            upload_mode: receipt.mode,
            part_count: receipt.part_count,
            object: receipt.object,
        };
        info!(
            rows = summary.row_count,
            blocks = summary.block_count,
            bytes = summary.byte_size,
            mode = %summary.upload_mode,
            parts = summary.part_count,
            "finalized stream"
        );
        Ok(summary)
    }

    /// Close out the Parquet footer, forward the trailing bytes, and commit.
    async fn finalize(&mut self, writer: ArrowWriter<SharedBuffer>) -> Result<CommitReceipt> {
        // Footer: schema, row-group index, total rows
        writer.close()?;
        let trailing = self.buffer.drain()?;
        self.byte_size += trailing.len() as u64;
        self.session.write(&trailing).await?;
        self.session.commit().await
    }

    /// Release the writer. Only valid after `finish` (idempotent once closed).
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Finalized | WriterState::Closed | WriterState::Aborted => {
                self.state = WriterState::Closed;
                Ok(())
            }
            WriterState::Unopened => {
                self.state = WriterState::Closed;
                Ok(())
            }
            WriterState::Writing => Err(Error::protocol(
                "close while writing; call finish() or abort() first",
            )),
        }
    }

    /// Abandon the stream and abort the upload session.
    pub async fn abort(&mut self) -> Result<()> {
        match self.state {
            WriterState::Aborted => return Ok(()),
            WriterState::Writing | WriterState::Unopened => {}
            WriterState::Finalized | WriterState::Closed => {
                return Err(Error::protocol("abort after the stream was finalized"));
            }
        }
        self.writer = None;
        self.session.abort().await?;
        self.state = WriterState::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::RecordGenerator;
    use crate::types::UploadMode;
    use crate::upload::MemoryTransport;
    use arrow::array::Int64Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::json;
    use test_case::test_case;

    fn writer(threshold: usize, codec: Codec) -> (StreamingBlockWriter<MemoryTransport>, MemoryTransport) {
        let transport = MemoryTransport::new();
        let session = PartUploadSession::new(transport.clone(), threshold);
        (StreamingBlockWriter::new(session, codec), transport)
    }

    fn records(range: std::ops::Range<i64>) -> Vec<Record> {
        range
            .map(|i| match json!({"id": i, "name": format!("row-{i}")}) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            })
            .collect()
    }

    fn decode(bytes: Bytes) -> Vec<arrow::record_batch::RecordBatch> {
        ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .build()
            .unwrap()
            .map(|b| b.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (mut writer, _) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();
        assert!(matches!(writer.start(), Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_write_before_start_fails() {
        let (mut writer, _) = writer(1 << 20, Codec::Snappy);
        let err = writer.write_block(&records(0..5)).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_block_and_row_accounting() {
        let (mut writer, _) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();

        writer.write_block(&records(0..100)).await.unwrap();
        writer.write_block(&records(100..200)).await.unwrap();
        writer.write_block(&records(200..250)).await.unwrap();

        let summary = writer.finish().await.unwrap();
        assert_eq!(summary.row_count, 250);
        assert_eq!(summary.block_count, 3);
        assert!(summary.byte_size > 0);
        assert_eq!(summary.upload_mode, UploadMode::SinglePut);
        assert_eq!(summary.part_count, 1);
    }

    #[test_case(Codec::Snappy)]
    #[test_case(Codec::Zstd)]
    #[test_case(Codec::Gzip)]
    #[test_case(Codec::Uncompressed)]
    #[tokio::test]
    async fn test_round_trip(codec: Codec) {
        let (mut writer, transport) = writer(1 << 20, codec);
        writer.start().unwrap();

        let input = records(0..50);
        writer.write_block(&input).await.unwrap();
        writer.finish().await.unwrap();

        let batches = decode(transport.committed_object().unwrap());
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 50);

        let ids = batches[0]
            .column_by_name("id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids.value(0), 0);
        assert_eq!(ids.value(49), 49);
    }

    #[tokio::test]
    async fn test_one_row_group_per_block() {
        let (mut writer, transport) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();
        writer.write_block(&records(0..10)).await.unwrap();
        writer.write_block(&records(10..20)).await.unwrap();
        writer.finish().await.unwrap();

        let reader =
            ParquetRecordBatchReaderBuilder::try_new(transport.committed_object().unwrap())
                .unwrap();
        assert_eq!(reader.metadata().num_row_groups(), 2);
    }

    #[tokio::test]
    async fn test_schema_mismatch_fails_before_sink() {
        let (mut writer, _) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();
        writer.write_block(&records(0..10)).await.unwrap();
        let forwarded = writer.bytes_forwarded();

        let bad: Vec<Record> = vec![match json!({"id": "not-a-number", "name": "x"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }];
        let err = writer.write_block(&bad).await.unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        // No bytes from the failed batch reached the sink
        assert_eq!(writer.bytes_forwarded(), forwarded);

        // The stream is still usable with conforming batches
        writer.write_block(&records(10..20)).await.unwrap();
        let summary = writer.finish().await.unwrap();
        assert_eq!(summary.row_count, 20);
        assert_eq!(summary.block_count, 2);
    }

    #[tokio::test]
    async fn test_empty_stream_refused_and_aborted() {
        let (mut writer, transport) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();

        let err = writer.finish().await.unwrap_err();
        assert!(matches!(err, Error::EmptyStream));
        assert!(transport.committed_object().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_skipped() {
        let (mut writer, _) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();
        assert!(writer.write_block(&[]).await.unwrap().is_none());
        assert_eq!(writer.blocks_written(), 0);
    }

    #[tokio::test]
    async fn test_close_from_writing_is_an_error() {
        let (mut writer, _) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();
        writer.write_block(&records(0..5)).await.unwrap();
        assert!(matches!(writer.close(), Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_close_idempotent_after_finish() {
        let (mut writer, transport) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();
        writer.write_block(&records(0..5)).await.unwrap();
        writer.finish().await.unwrap();

        writer.close().unwrap();
        writer.close().unwrap();

        // Footer was written exactly once: the object still decodes
        let batches = decode(transport.committed_object().unwrap());
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 5);
    }

    #[tokio::test]
    async fn test_abort_leaves_no_object() {
        let (mut writer, transport) = writer(256, Codec::Snappy);
        writer.start().unwrap();
        let rows: Vec<Record> = RecordGenerator::new(3).take(200).map(|r| r.unwrap()).collect();
        writer.write_block(&rows).await.unwrap();
        assert!(writer.bytes_forwarded() > 256);

        writer.abort().await.unwrap();
        assert!(transport.committed_object().is_none());
        assert!(matches!(
            writer.write_block(&rows).await,
            Err(Error::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_upload_poisons_the_stream() {
        let (mut writer, transport) = writer(256, Codec::Snappy);
        transport.fail_uploads(true);
        writer.start().unwrap();

        let rows: Vec<Record> = RecordGenerator::new(7).take(500).map(|r| r.unwrap()).collect();
        let err = writer.write_block(&rows).await.unwrap_err();
        assert!(err.is_retryable());

        // The stream may hold bytes the sink never saw, so finish must
        // refuse instead of committing a truncated object
        assert!(matches!(writer.finish().await, Err(Error::Protocol { .. })));
        assert!(transport.committed_object().is_none());

        // Abort stays idempotent after the internal one
        writer.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_small_block_reports_encoded_size() {
        // A block smaller than the ArrowWriter's internal buffering must
        // still report the size of its row group
        let (mut writer, transport) = writer(1 << 20, Codec::Snappy);
        writer.start().unwrap();

        let block = writer.write_block(&records(0..5)).await.unwrap().unwrap();
        assert_eq!(block.row_count, 5);
        assert!(block.byte_len > 0);

        // All bytes still land in the object once the stream finishes
        let summary = writer.finish().await.unwrap();
        assert_eq!(
            summary.byte_size as usize,
            transport.committed_object().unwrap().len()
        );
    }

    #[tokio::test]
    async fn test_multipart_stream_round_trips() {
        // Tiny threshold forces several parts; the reassembled object must
        // still be a valid Parquet file.
        let (mut writer, transport) = writer(512, Codec::Snappy);
        writer.start().unwrap();

        let rows: Vec<Record> = RecordGenerator::new(5).take(300).map(|r| r.unwrap()).collect();
        for chunk in rows.chunks(100) {
            writer.write_block(chunk).await.unwrap();
        }
        let summary = writer.finish().await.unwrap();

        assert_eq!(summary.upload_mode, UploadMode::Multipart);
        assert!(summary.part_count >= 2);

        let batches = decode(transport.committed_object().unwrap());
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 300);
    }
}
