use std::io::{self, BufRead};

/// Prefix of every metadata line in a VCF header.
const META_PREFIX: &str = "##";
const INFO_PREFIX: &str = "##INFO";
const FORMAT_PREFIX: &str = "##FORMAT";

/// Version reported when the header carries no parseable `v<digits>` token.
pub const INVALID_VERSION: f64 = -1.0;

/// Everything extracted from the leading lines of a VCF file.
///
/// The header section is every line up to and including the first line that
/// does not start with `##`; that final line is the column header whose
/// whitespace tokens 10 onward name the samples.
#[derive(Debug, Clone, Default)]
pub struct VcfHeader {
    /// Format version, or [`INVALID_VERSION`] if none was found.
    pub version: f64,
    /// Sample names in column order. Order is load-bearing: it defines the
    /// positional mapping to genotype fields in every data row.
    pub samples: Vec<String>,
    /// Raw `##INFO` declaration lines, in header order.
    pub info_declarations: Vec<String>,
    /// Raw `##FORMAT` declaration lines, in header order.
    pub format_declarations: Vec<String>,
}

/// Reads the header section from `reader`, leaving it positioned at the
/// first data row.
pub fn read_header<R: BufRead>(reader: &mut R) -> io::Result<VcfHeader> {
    let mut lines: Vec<String> = Vec::new();
    let mut buf = String::new();

    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        lines.push(buf.trim_end_matches(['\n', '\r']).to_string());
        if !lines[lines.len() - 1].starts_with(META_PREFIX) {
            break;
        }
    }

    let version = lines.first().map_or(INVALID_VERSION, |s| parse_version(s));

    // The column header line is consumed for its sample names; if input
    // ended while still inside the metadata section there is none.
    let mut samples = Vec::new();
    if lines.last().is_some_and(|l| !l.starts_with(META_PREFIX)) {
        let column_line = lines.pop().unwrap_or_default();
        samples = column_line
            .split_whitespace()
            .skip(9)
            .map(String::from)
            .collect();
    }

    let mut header = VcfHeader {
        version,
        samples,
        ..VcfHeader::default()
    };
    for line in lines {
        if line.starts_with(INFO_PREFIX) {
            header.info_declarations.push(line);
        } else if line.starts_with(FORMAT_PREFIX) {
            header.format_declarations.push(line);
        }
    }

    Ok(header)
}

/// Parses the format version from a `##fileformat=VCFv4.2` line.
///
/// The line is split on `v`; anything other than exactly two tokens, or a
/// second token that is not a number, yields the invalid sentinel.
pub fn parse_version(line: &str) -> f64 {
    let tokens: Vec<&str> = line.split('v').collect();
    match tokens.as_slice() {
        [_, version] => version.trim().parse().unwrap_or(INVALID_VERSION),
        _ => INVALID_VERSION,
    }
}
