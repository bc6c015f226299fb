use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use apache_avro::{Codec, Schema, Writer};
use thiserror::Error;

/// Errors raised while preparing or writing the destination.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("'{}' exists; use --force to overwrite", .0.display())]
    DestinationExists(PathBuf),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize schema document")]
    Json(#[from] serde_json::Error),
}

/// Creates the destination file, refusing to clobber an existing one unless
/// `force` is set.
pub fn create_destination(path: &Path, force: bool) -> Result<BufWriter<File>, OutputError> {
    if path.exists() {
        if !force {
            return Err(OutputError::DestinationExists(path.to_path_buf()));
        }
        fs::remove_file(path)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Opens an Avro object container for writing with the given schema. Blocks
/// are Deflate-compressed, matching the original tool.
pub fn open_container<W: Write>(schema: &Schema, dest: W) -> Writer<'_, W> {
    Writer::with_codec(schema, dest, Codec::Deflate)
}

/// Writes the induced schema document to `path` as pretty-printed JSON
/// (generate-schema mode).
pub fn write_schema_document(
    path: &Path,
    document: &serde_json::Value,
    force: bool,
) -> Result<(), OutputError> {
    let mut dest = create_destination(path, force)?;
    serde_json::to_writer_pretty(&mut dest, document)?;
    writeln!(dest)?;
    dest.flush()?;
    Ok(())
}
