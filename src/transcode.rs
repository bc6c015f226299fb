use std::collections::HashMap;
use std::io::{self, BufRead};
use std::mem;

use apache_avro::types::Value as AvroValue;
use thiserror::Error;

use crate::schema::{
    ALT_INDEX, COLUMN_SEPARATOR, ColumnMap, DecodeError, Decoder, FIXED_COLUMNS, INFO_NAMESPACE,
    MISSING_VALUE, REF_INDEX,
};

/// Multi-allelic missing-genotype marker seen in 1000 Genomes data. Treated
/// the same as the plain missing sentinel; preserved behavior, do not "fix".
const MULTI_ALLELIC_MISSING: &str = ".,.";

/// Byte-string values longer than this are cut when truncation is enabled.
const TRUNCATE_LIMIT: usize = 253;
/// Appended to a truncated value to signal the loss to downstream readers.
const TRUNCATE_MARKER: u8 = b'+';

/// A requested output column that does not exist in the induced schema.
#[derive(Debug, Error)]
#[error("requested column '{0}' is not present in the schema")]
pub struct MissingColumn(pub String);

/// Errors raised while transcoding a data row.
#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct TranscodeError {
    pub line: u64,
    #[source]
    pub kind: TranscodeErrorKind,
}

#[derive(Debug, Error)]
pub enum TranscodeErrorKind {
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("expected at least 8 whitespace-delimited fields, found {0}")]
    FieldCount(usize),
    #[error("column {column}: {source}")]
    Decode {
        column: String,
        #[source]
        source: DecodeError,
    },
}

/// Row-level options; the progress callback is injected separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeOptions {
    /// Cut REF/ALT values longer than 253 bytes, appending a `+` marker.
    pub truncate: bool,
    /// Invoke the progress callback every this many emitted rows (0: never).
    pub progress_every: u64,
}

type ProgressFn = Box<dyn FnMut(u64)>;

/// Streams VCF data rows into typed Avro records.
///
/// Single-pass and lazy: one record per input line, pulled on demand. The
/// column map is consulted identically for every row; all routing decisions
/// (which positional field, INFO key, or sample field feeds which output
/// column) are resolved once at construction.
pub struct RowTranscoder<R> {
    reader: R,
    buf: String,
    /// Output columns in schema field order, with their decoders.
    columns: Vec<(String, Decoder)>,
    /// (position in the data row, output slot) for requested fixed columns.
    fixed: Vec<(usize, usize)>,
    /// INFO key → output slot.
    info: HashMap<String, usize>,
    /// Per sample, in sample order: genotype field name → output slot.
    genotype: Vec<HashMap<String, usize>>,
    truncate: bool,
    line: u64,
    rows: u64,
    malformed_samples: u64,
    truncated_values: u64,
    progress_every: u64,
    on_progress: Option<ProgressFn>,
}

impl<R> std::fmt::Debug for RowTranscoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowTranscoder")
            .field("line", &self.line)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> RowTranscoder<R> {
    /// Builds a transcoder emitting exactly the `requested` columns, in
    /// order. Fails if a requested column is absent from `columns` or names
    /// a sample not present in `samples`.
    pub fn new(
        reader: R,
        columns: &ColumnMap,
        requested: &[String],
        samples: &[String],
        options: TranscodeOptions,
    ) -> Result<Self, MissingColumn> {
        let mut output = Vec::with_capacity(requested.len());
        let mut fixed = Vec::new();
        let mut info = HashMap::new();
        let mut genotype: Vec<HashMap<String, usize>> = vec![HashMap::new(); samples.len()];

        for (slot, name) in requested.iter().enumerate() {
            let decoder = *columns
                .get(name)
                .ok_or_else(|| MissingColumn(name.clone()))?;
            output.push((name.clone(), decoder));

            if let Some(position) = FIXED_COLUMNS.iter().position(|f| *f == name.as_str()) {
                fixed.push((position, slot));
            } else if let Some(local) = name.strip_prefix(INFO_NAMESPACE)
                && let Some(local) = local.strip_prefix(COLUMN_SEPARATOR)
            {
                info.insert(local.to_string(), slot);
            } else if let Some((sample, local)) = name.rsplit_once(COLUMN_SEPARATOR) {
                let index = samples
                    .iter()
                    .position(|s| s == sample)
                    .ok_or_else(|| MissingColumn(name.clone()))?;
                genotype[index].insert(local.to_string(), slot);
            } else {
                return Err(MissingColumn(name.clone()));
            }
        }

        Ok(Self {
            reader,
            buf: String::new(),
            columns: output,
            fixed,
            info,
            genotype,
            truncate: options.truncate,
            line: 0,
            rows: 0,
            malformed_samples: 0,
            truncated_values: 0,
            progress_every: options.progress_every,
            on_progress: None,
        })
    }

    /// Injects the progress callback, invoked with the running row count.
    pub fn set_progress(&mut self, callback: ProgressFn) {
        self.on_progress = Some(callback);
    }

    /// Rows emitted so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Sample fields skipped because their token count did not match the
    /// row's declared field layout.
    pub fn malformed_samples(&self) -> u64 {
        self.malformed_samples
    }

    /// REF/ALT values cut by the truncation policy.
    pub fn truncated_values(&self) -> u64 {
        self.truncated_values
    }

    fn transcode_line(&mut self, line: &str) -> Result<AvroValue, TranscodeErrorKind> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(TranscodeErrorKind::FieldCount(fields.len()));
        }

        // The intermediate row: one slot per output column, None meaning
        // the value is missing and will be stored as null.
        let mut row: Vec<Option<AvroValue>> = vec![None; self.columns.len()];

        for &(position, slot) in &self.fixed {
            let raw = fields[position];
            if raw == MISSING_VALUE {
                continue;
            }
            let mut value = decode_slot(&self.columns, slot, raw)?;
            if self.truncate && (position == REF_INDEX || position == ALT_INDEX) {
                self.truncated_values += truncate_bytes(&mut value);
            }
            row[slot] = Some(value);
        }

        for token in fields[7].split(';') {
            // A bare key is a Flag, recorded as the literal value 1. A token
            // with more than one '=' gets the same treatment: noisy
            // annotations are absorbed, not fatal.
            let parts: Vec<&str> = token.split('=').collect();
            let (key, raw) = match parts.as_slice() {
                [key, value] => (*key, *value),
                [key, ..] => (*key, "1"),
                [] => continue,
            };
            if let Some(&slot) = self.info.get(key) {
                row[slot] = Some(decode_slot(&self.columns, slot, raw)?);
            }
        }

        if fields.len() > 8 {
            // Field 9 declares this row's genotype field layout, shared by
            // every sample column that follows.
            let layout: Vec<&str> = fields[8].split(':').collect();
            for (sample_slots, raw) in self.genotype.iter().zip(&fields[9..]) {
                let tokens: Vec<&str> = raw.split(':').collect();
                if tokens.len() != layout.len() {
                    // Malformed sample data is dropped, not fatal.
                    self.malformed_samples += 1;
                    tracing::debug!(line = self.line, sample = %raw, "skipping malformed sample");
                    continue;
                }
                for (field, token) in layout.iter().zip(&tokens) {
                    if let Some(&slot) = sample_slots.get(*field)
                        && *token != MISSING_VALUE
                        && *token != MULTI_ALLELIC_MISSING
                    {
                        row[slot] = Some(decode_slot(&self.columns, slot, token)?);
                    }
                }
            }
        }

        let record = self
            .columns
            .iter()
            .zip(row)
            .map(|((name, _), value)| (name.clone(), value.unwrap_or(AvroValue::Null)))
            .collect();
        Ok(AvroValue::Record(record))
    }
}

fn decode_slot(
    columns: &[(String, Decoder)],
    slot: usize,
    raw: &str,
) -> Result<AvroValue, TranscodeErrorKind> {
    let (name, decoder) = &columns[slot];
    decoder
        .decode(raw)
        .map_err(|source| TranscodeErrorKind::Decode {
            column: name.clone(),
            source,
        })
}

/// Cuts an over-long byte value to the limit plus a trailing marker byte.
/// Returns the number of values truncated (0 or 1).
fn truncate_bytes(value: &mut AvroValue) -> u64 {
    if let AvroValue::Bytes(bytes) = value
        && bytes.len() > TRUNCATE_LIMIT
    {
        bytes.truncate(TRUNCATE_LIMIT);
        bytes.push(TRUNCATE_MARKER);
        return 1;
    }
    0
}

impl<R: BufRead> Iterator for RowTranscoder<R> {
    type Item = Result<AvroValue, TranscodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let line = mem::take(&mut self.buf);
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.is_empty() {
                        self.buf = line;
                        continue;
                    }
                    let result = self.transcode_line(trimmed);
                    self.buf = line;
                    return Some(match result {
                        Ok(record) => {
                            self.rows += 1;
                            if self.progress_every > 0
                                && self.rows % self.progress_every == 0
                                && let Some(callback) = &mut self.on_progress
                            {
                                callback(self.rows);
                            }
                            Ok(record)
                        }
                        Err(kind) => Err(TranscodeError {
                            line: self.line,
                            kind,
                        }),
                    });
                }
                Err(e) => {
                    return Some(Err(TranscodeError {
                        line: self.line,
                        kind: TranscodeErrorKind::Io(e),
                    }));
                }
            }
        }
    }
}
