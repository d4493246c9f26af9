//! Write pipeline
//!
//! Drives the full flow: record source → batcher → block-size estimation on
//! the first records → streaming writer → part upload session. Exactly one
//! batch is in flight at any time; the consumer side pulls, so memory use
//! stays flat no matter how many records the source yields.

use crate::batch::Batcher;
use crate::config::AppConfig;
use crate::error::Result;
use crate::estimate;
use crate::generate::RecordGenerator;
use crate::store::Destination;
use crate::types::{Record, WriteSummary};
use crate::upload::{ObjectStoreTransport, ObjectTransport, PartUploadSession};
use crate::writer::StreamingBlockWriter;
use tracing::{info, warn};

/// Records drawn up front to measure average encoded row size
const SAMPLE_ROWS: usize = 512;

/// Run the pipeline against the configured destination
pub async fn run(config: &AppConfig) -> Result<WriteSummary> {
    config.validate()?;

    let dest = Destination::parse(&config.output)?;
    info!(
        destination = dest.url(),
        scheme = dest.scheme(),
        records = config.num_records,
        "starting write pipeline"
    );

    let transport = ObjectStoreTransport::new(dest.store(), dest.path().clone(), dest.url());
    let source = RecordGenerator::new(config.seed).take(config.num_records);
    write_stream(source, transport, config).await
}

/// Stream `source` through a writer into `transport`.
///
/// Split out from [`run`] so tests can substitute both the record source
/// and the transport.
pub async fn write_stream<I, T>(mut source: I, transport: T, config: &AppConfig) -> Result<WriteSummary>
where
    I: Iterator<Item = Result<Record>>,
    T: ObjectTransport,
{
    let session = PartUploadSession::new(transport, config.part_size_bytes());
    let mut writer = StreamingBlockWriter::new(session, config.codec);
    writer.start()?;

    match drive(&mut source, &mut writer, config).await {
        Ok(summary) => {
            writer.close()?;
            Ok(summary)
        }
        Err(e) => {
            if let Err(abort_err) = writer.abort().await {
                warn!(error = %abort_err, "failed to abort writer after pipeline error");
            }
            Err(e)
        }
    }
}

async fn drive<I, T>(
    source: &mut I,
    writer: &mut StreamingBlockWriter<T>,
    config: &AppConfig,
) -> Result<WriteSummary>
where
    I: Iterator<Item = Result<Record>>,
    T: ObjectTransport,
{
    // Sample the head of the stream once to size all blocks. The sampled
    // records are chained back in front of the remainder, so nothing is
    // encoded twice and nothing is lost.
    let mut sample: Vec<Record> = Vec::with_capacity(SAMPLE_ROWS);
    for record in source.by_ref().take(SAMPLE_ROWS) {
        sample.push(record?);
    }

    let rows_per_block =
        estimate::rows_per_block(&sample, config.block_size_bytes(), config.codec)?;
    info!(
        rows_per_block,
        sampled = sample.len(),
        block_budget_bytes = config.block_size_bytes(),
        "sized blocks from sample"
    );

    let combined = sample.into_iter().map(Ok).chain(source);
    let batcher = Batcher::new(combined, rows_per_block);

    for batch in batcher {
        writer.write_block(&batch?).await?;
    }

    writer.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{Codec, UploadMode};
    use crate::upload::MemoryTransport;
    use serde_json::json;

    fn records(range: std::ops::Range<i64>) -> impl Iterator<Item = Result<Record>> {
        range.map(|i| match json!({"id": i, "name": format!("row-{i}")}) {
            serde_json::Value::Object(map) => Ok(map),
            _ => unreachable!(),
        })
    }

    fn config() -> AppConfig {
        AppConfig {
            num_records: 1000,
            block_size_mb: 1,
            part_size_mb: 5,
            codec: Codec::Snappy,
            output: "unused".to_string(),
            seed: 42,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_memory_transport() {
        let transport = MemoryTransport::new();
        let summary = write_stream(records(0..1000), transport.clone(), &config())
            .await
            .unwrap();

        assert_eq!(summary.row_count, 1000);
        assert!(summary.block_count >= 1);
        assert_eq!(summary.upload_mode, UploadMode::SinglePut);
        assert!(transport.committed_object().is_some());
    }

    #[tokio::test]
    async fn test_empty_source_writes_nothing() {
        let transport = MemoryTransport::new();
        let err = write_stream(records(0..0), transport.clone(), &config())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmptyStream));
        assert!(transport.committed_object().is_none());
    }

    #[tokio::test]
    async fn test_source_error_aborts_upload() {
        let source = records(0..10).chain(std::iter::once(Err(Error::generate("boom"))));
        let transport = MemoryTransport::new();
        let err = write_stream(source, transport.clone(), &config())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Generate { .. }));
        assert!(transport.committed_object().is_none());
    }

    #[tokio::test]
    async fn test_estimated_rebatching_scenario() {
        // 250 records with 150 rows per block must yield two blocks of
        // 150 and 100 rows even though the source arrived as 100/100/50.
        let source = records(0..100).chain(records(100..200)).chain(records(200..250));
        let batcher = Batcher::new(source, 150);

        let transport = MemoryTransport::new();
        let session = PartUploadSession::new(transport.clone(), 5 * 1024 * 1024);
        let mut writer = StreamingBlockWriter::new(session, Codec::Snappy);
        writer.start().unwrap();

        let mut block_rows = Vec::new();
        for batch in batcher {
            let block = writer.write_block(&batch.unwrap()).await.unwrap().unwrap();
            block_rows.push(block.row_count);
        }
        let summary = writer.finish().await.unwrap();

        assert_eq!(block_rows, vec![150, 100]);
        assert_eq!(summary.row_count, 250);
        assert_eq!(summary.block_count, 2);
    }

    #[tokio::test]
    async fn test_generated_run_is_deterministic() {
        let mut cfg = config();
        cfg.num_records = 200;

        let a = MemoryTransport::new();
        let b = MemoryTransport::new();
        write_stream(
            RecordGenerator::new(cfg.seed).take(cfg.num_records),
            a.clone(),
            &cfg,
        )
        .await
        .unwrap();
        write_stream(
            RecordGenerator::new(cfg.seed).take(cfg.num_records),
            b.clone(),
            &cfg,
        )
        .await
        .unwrap();

        assert_eq!(a.committed_object().unwrap(), b.committed_object().unwrap());
    }

    #[tokio::test]
    async fn test_run_against_local_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.parquet");
        let cfg = AppConfig {
            num_records: 500,
            output: target.to_str().unwrap().to_string(),
            ..config()
        };

        let summary = run(&cfg).await.unwrap();
        assert_eq!(summary.row_count, 500);
        assert!(target.is_file());
        assert_eq!(std::fs::metadata(&target).unwrap().len(), summary.byte_size);
    }
}
