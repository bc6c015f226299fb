use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use crate::smart_reader::STDIN_MARKER;
use crate::{ConversionConfig, ConversionSummary, convert_vcf_file};

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert a VCF file to an Avro object container file", long_about = None)]
struct Cli {
    /// VCF file to convert (use '-' for STDIN)
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Output Avro file, or schema file with --generate-schema
    #[arg(value_name = "DEST")]
    dest: PathBuf,

    /// Suppress the progress monitor
    #[arg(long, short)]
    quiet: bool,

    /// Force over-writing of an existing destination
    #[arg(long, short)]
    force: bool,

    /// Truncate REF and ALT values longer than 253 bytes and suffix them
    /// with a '+' to indicate that truncation has occurred
    #[arg(long, short)]
    truncate: bool,

    /// Cache size in bytes; suffixes K, M and G also supported. Accepted
    /// for compatibility; the Avro writer does not use it.
    #[arg(long, short, default_value = "64M", value_name = "SIZE")]
    cache_size: String,

    /// Generate a schema for the source VCF file and write it to DEST.
    /// Only reads the header of the VCF file.
    #[arg(long, short, conflicts_with = "schema")]
    generate_schema: bool,

    /// Use the schema from this file rather than the generated one
    #[arg(long, short, value_name = "SCHEMA")]
    schema: Option<PathBuf>,

    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let cache_size = parse_cache_size(&cli.cache_size)
        .with_context(|| format!("invalid --cache-size '{}'", cli.cache_size))?;
    tracing::debug!(cache_size, "cache size accepted (unused by the Avro writer)");

    let config = ConversionConfig {
        source: cli.source.clone(),
        dest: cli.dest.clone(),
        force: cli.force,
        truncate: cli.truncate,
        // Progress is meaningless when the source is a pipe.
        quiet: cli.quiet || cli.source == STDIN_MARKER,
        generate_schema: cli.generate_schema,
        schema: cli.schema.clone(),
    };

    let summary = convert_vcf_file(&config)?;

    if cli.generate_schema {
        println!("Wrote induced schema to {}.", cli.dest.display());
    } else {
        print_summary(&summary, &cli.dest);
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
    Ok(())
}

fn print_summary(summary: &ConversionSummary, dest: &std::path::Path) {
    println!(
        "Transcoded {rows} rows into {dest}.",
        rows = summary.rows,
        dest = dest.display(),
    );

    if summary.malformed_samples > 0 {
        println!(
            "Skipped {count} sample fields with malformed genotype data.",
            count = summary.malformed_samples
        );
    }

    if summary.truncated_values > 0 {
        println!(
            "Truncated {count} REF/ALT values longer than 253 bytes.",
            count = summary.truncated_values
        );
    }
}

/// Parses a size with an optional K, M or G suffix into bytes.
fn parse_cache_size(raw: &str) -> Result<u64> {
    let (digits, multiplier) = match raw.chars().last() {
        Some('K' | 'k') => (&raw[..raw.len() - 1], 1u64 << 10),
        Some('M' | 'm') => (&raw[..raw.len() - 1], 1u64 << 20),
        Some('G' | 'g') => (&raw[..raw.len() - 1], 1u64 << 30),
        _ => (raw, 1),
    };
    let value: u64 = digits.parse()?;
    Ok(value * multiplier)
}
