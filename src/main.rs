//! parquet-stream CLI
//!
//! Generates fake records and streams them as a block-structured Parquet
//! file to the configured destination.

use clap::Parser;
use parquet_stream::config::AppConfig;
use parquet_stream::types::Codec;
use parquet_stream::{pipeline, WriteSummary};

/// Stream generated records into an uploaded Parquet file
#[derive(Parser, Debug)]
#[command(name = "parquet-stream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of records to generate
    #[arg(short = 'n', long)]
    records: Option<usize>,

    /// Target block (row group) size in megabytes
    #[arg(long)]
    block_size_mb: Option<usize>,

    /// Multipart part-size threshold in megabytes
    #[arg(long)]
    part_size_mb: Option<usize>,

    /// Compression codec: snappy, zstd, gzip, uncompressed
    #[arg(short, long)]
    compression: Option<Codec>,

    /// Destination: s3://bucket/key, r2://bucket/key, or a local path
    #[arg(short, long)]
    output: Option<String>,

    /// Generator seed
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Environment-sourced config with CLI flags layered on top
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::from_env()?;
        if let Some(records) = self.records {
            config.num_records = records;
        }
        if let Some(block_size_mb) = self.block_size_mb {
            config.block_size_mb = block_size_mb;
        }
        if let Some(part_size_mb) = self.part_size_mb {
            config.part_size_mb = part_size_mb;
        }
        if let Some(codec) = self.compression {
            config.codec = codec;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn print_summary(summary: &WriteSummary) {
    let secs = summary.elapsed.as_secs_f64();
    let mb = summary.byte_size as f64 / (1024.0 * 1024.0);

    println!();
    println!("{}", "=".repeat(60));
    println!("EXECUTION SUMMARY");
    println!("{}", "=".repeat(60));
    println!("  Rows:            {}", summary.row_count);
    println!("  Blocks:          {}", summary.block_count);
    println!("  File size:       {mb:.2} MB");
    println!("  Avg row size:    {:.1} bytes", summary.avg_row_bytes());
    println!("  Compression:     {}", summary.codec);
    println!("  Upload mode:     {}", summary.upload_mode);
    println!("  Parts:           {}", summary.part_count);
    println!("  Destination:     {}", summary.object);
    println!("  Elapsed:         {secs:.2} s");
    if secs > 0.0 {
        println!("  Throughput:      {:.2} MB/s", mb / secs);
    }
    println!("{}", "=".repeat(60));
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    let result = async {
        let config = cli.into_config()?;
        let summary = pipeline::run(&config).await?;
        Ok::<_, anyhow::Error>(summary)
    }
    .await;

    match result {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
