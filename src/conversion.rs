use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use apache_avro::Schema;
use indicatif::ProgressBar;

use crate::header;
use crate::output;
use crate::schema::InducedSchema;
use crate::smart_reader;
use crate::transcode::{RowTranscoder, TranscodeOptions};

/// Update the progress monitor every this many rows, or ten times less
/// often for inputs over a gibibyte, matching the original tool.
const PROGRESS_ROWS: u64 = 100;
const PROGRESS_ROWS_LARGE: u64 = 1000;
const LARGE_INPUT_BYTES: u64 = 1 << 30;

/// Configuration required to drive a conversion.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Input VCF path, or `-` for stdin.
    pub source: String,
    /// Output container path, or schema path in generate-schema mode.
    pub dest: PathBuf,
    /// Overwrite an existing destination.
    pub force: bool,
    /// Apply the REF/ALT truncation policy.
    pub truncate: bool,
    /// Suppress the progress monitor.
    pub quiet: bool,
    /// Only induce the schema and write it to `dest`.
    pub generate_schema: bool,
    /// Externally authored schema to use instead of the induced one; its
    /// record fields select the transcoded column subset.
    pub schema: Option<PathBuf>,
}

/// Counters accumulated over one conversion run.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ConversionSummary {
    pub rows: u64,
    pub malformed_samples: u64,
    pub truncated_values: u64,
}

/// Converts a VCF file into an Avro object container per `config`.
///
/// Schema-construction failures (unsupported version, unknown declared type,
/// malformed declarations, missing requested columns) are fatal and fire
/// before the destination is created. Row decode failures abort the run.
pub fn convert_vcf_file(config: &ConversionConfig) -> Result<ConversionSummary> {
    tracing::info!(
        source = %config.source,
        dest = %config.dest.display(),
        truncate = config.truncate,
        "starting conversion",
    );

    let (mut reader, input_size) = smart_reader::open_source(&config.source)?;
    let vcf_header = header::read_header(&mut reader).context("failed to read VCF header")?;
    tracing::debug!(
        version = vcf_header.version,
        samples = vcf_header.samples.len(),
        info_declarations = vcf_header.info_declarations.len(),
        format_declarations = vcf_header.format_declarations.len(),
        "header parsed",
    );

    let induced = InducedSchema::from_header(&vcf_header)?;

    if config.generate_schema {
        output::write_schema_document(&config.dest, &induced.to_document(), config.force)?;
        return Ok(ConversionSummary::default());
    }

    let (schema, requested) = match &config.schema {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read schema file {}", path.display()))?;
            let schema = Schema::parse_str(&raw)
                .with_context(|| format!("invalid Avro schema in {}", path.display()))?;
            let requested = record_field_names(&schema)?;
            (schema, requested)
        }
        None => {
            let document = induced.to_document();
            let schema = Schema::parse_str(&document.to_string())
                .context("induced schema is not a valid Avro schema")?;
            (schema, induced.column_names())
        }
    };

    let mut transcoder = RowTranscoder::new(
        reader,
        &induced.column_map(),
        &requested,
        &vcf_header.samples,
        TranscodeOptions {
            truncate: config.truncate,
            progress_every: progress_interval(input_size),
        },
    )?;

    let progress = if config.quiet {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        let sink = bar.clone();
        transcoder.set_progress(Box::new(move |rows| {
            sink.set_message(format!("{rows} rows"));
        }));
        Some(bar)
    };

    let dest = output::create_destination(&config.dest, config.force)?;
    let mut writer = output::open_container(&schema, dest);

    for result in &mut transcoder {
        let record = result?;
        // Resolving against the writer schema wraps values into the proper
        // nullable-union branches, whatever branch order the schema uses.
        let resolved = record
            .resolve(&schema)
            .context("record does not conform to the output schema")?;
        writer
            .append(resolved)
            .context("failed to append record to container")?;
    }
    let mut dest = writer
        .into_inner()
        .context("failed to finalize container")?;
    dest.flush().context("failed to flush destination")?;

    if let Some(bar) = progress {
        bar.finish_with_message(format!("{} rows", transcoder.rows()));
    }

    let summary = ConversionSummary {
        rows: transcoder.rows(),
        malformed_samples: transcoder.malformed_samples(),
        truncated_values: transcoder.truncated_values(),
    };
    tracing::info!(
        rows = summary.rows,
        malformed_samples = summary.malformed_samples,
        truncated_values = summary.truncated_values,
        "conversion finished",
    );
    Ok(summary)
}

fn progress_interval(input_size: Option<u64>) -> u64 {
    match input_size {
        Some(size) if size > LARGE_INPUT_BYTES => PROGRESS_ROWS_LARGE,
        _ => PROGRESS_ROWS,
    }
}

/// Top-level field names of an externally authored record schema.
fn record_field_names(schema: &Schema) -> Result<Vec<String>> {
    match schema {
        Schema::Record(record) => Ok(record.fields.iter().map(|f| f.name.clone()).collect()),
        other => anyhow::bail!(
            "expected a record schema, found {:?}",
            apache_avro::schema::SchemaKind::from(other)
        ),
    }
}
