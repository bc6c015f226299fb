use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use flate2::read::MultiGzDecoder;

/// The SOURCE argument naming standard input.
pub const STDIN_MARKER: &str = "-";

/// Opens the conversion source, transparently peeling off GZIP/BGZF layers
/// to expose the underlying text stream.
///
/// Returns the reader and, for regular files, the on-disk size used to pick
/// a progress update interval. Stdin has no size.
pub fn open_source(source: &str) -> anyhow::Result<(Box<dyn BufRead>, Option<u64>)> {
    if source == STDIN_MARKER {
        return Ok((Box::new(io::stdin().lock()), None));
    }

    let path = Path::new(source);
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let size = file.metadata().ok().map(|m| m.len());
    let mut reader: Box<dyn BufRead> = Box::new(BufReader::new(file));

    // Nested gzip members are possible (e.g. re-compressed downloads);
    // bound the peeling to avoid looping on pathological inputs.
    let mut depth = 0;
    const MAX_DEPTH: usize = 10;
    while depth < MAX_DEPTH {
        let is_gzip = {
            let buf = reader.fill_buf()?;
            // GZIP magic: 1f 8b
            buf.len() >= 2 && buf[0] == 0x1f && buf[1] == 0x8b
        };
        if !is_gzip {
            break;
        }
        tracing::debug!("detected GZIP/BGZF layer");
        // MultiGzDecoder handles BGZF and concatenated GZIP members.
        reader = Box::new(BufReader::new(MultiGzDecoder::new(reader)));
        depth += 1;
    }

    Ok((reader, size))
}
