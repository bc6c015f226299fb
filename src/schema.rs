use std::collections::HashMap;
use std::num::{ParseFloatError, ParseIntError};

use apache_avro::types::Value as AvroValue;
use serde_json::json;
use thiserror::Error;

use crate::header::VcfHeader;

/// Minimum VCF version the schema builder accepts.
pub const MIN_SUPPORTED_VERSION: f64 = 4.0;

/// Namespace of the emitted Avro schema document.
pub const SCHEMA_NAMESPACE: &str = "vcf.avro";
/// Record name of the emitted Avro schema document.
pub const SCHEMA_NAME: &str = "VCF";

/// Joins a column's namespace (INFO or a sample name) to its local name.
/// Reserved: must not otherwise appear in fixed column names.
pub const COLUMN_SEPARATOR: char = '_';

/// Namespace under which INFO annotation columns are registered.
pub const INFO_NAMESPACE: &str = "INFO";

/// The single-byte token VCF uses for "no value".
pub const MISSING_VALUE: &str = ".";

/// The seven fixed VCF columns, in file order.
pub const FIXED_COLUMNS: [&str; 7] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER"];

/// Positions of REF and ALT within a data row, the two columns subject to
/// the truncation policy.
pub const REF_INDEX: usize = 3;
pub const ALT_INDEX: usize = 4;

// Fixed column documentation, from the VCF 4.1 specification.
const CHROM_DOC: &str = "chromosome: an identifier from the reference genome or an \
    angle-bracketed ID String (\"<ID>\") pointing to a contig in the assembly file";
const POS_DOC: &str = "position: The reference position, with the 1st base having position 1";
const ID_DOC: &str = "semi-colon separated list of unique identifiers where available";
const REF_DOC: &str = "reference base(s): Each base must be one of A,C,G,T,N (case insensitive)";
const ALT_DOC: &str = "comma separated list of alternate non-reference alleles called on at \
    least one of the samples";
const QUAL_DOC: &str = "phred-scaled quality score for the assertion made in ALT. i.e. \
    -10log_10 prob(call in ALT is wrong).";
const FILTER_DOC: &str = "PASS if this position has passed all filters, i.e. a call is made \
    at this position. Otherwise, if the site has not passed all filters, a semicolon-separated \
    list of codes for filters that fail.";

/// Errors raised while inducing a schema from a VCF header.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(
        "VCF versions below {MIN_SUPPORTED_VERSION} are not supported (found {0}; -1 means \
         no version line was recognized)"
    )]
    UnsupportedVersion(f64),
    #[error("unknown VCF field type: {0}")]
    UnknownFieldType(String),
    #[error("malformed declaration line: {0}")]
    MalformedDeclaration(String),
}

/// The closed set of primitive types a VCF header may declare.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FieldType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

impl std::str::FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, SchemaError> {
        match s {
            "Integer" => Ok(Self::Integer),
            "Float" => Ok(Self::Float),
            "Flag" => Ok(Self::Flag),
            "Character" => Ok(Self::Character),
            "String" => Ok(Self::String),
            other => Err(SchemaError::UnknownFieldType(other.to_string())),
        }
    }
}

/// Element type of an induced column, named after its Avro encoding.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ElementType {
    Int,
    Float,
    Bytes,
}

impl ElementType {
    fn avro_name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bytes => "bytes",
        }
    }
}

/// Number of elements a column holds.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Arity {
    /// Exactly one value.
    One,
    /// A fixed count greater than one.
    Fixed(u32),
    /// A comma-delimited list of unknown length.
    Variable,
}

/// Parses a declared `Number` attribute into an arity.
///
/// Symbolic markers (`.`, `A`, `G`, ...) fail the integer parse and mean
/// variable. Zero and negative counts also mean variable; some real-world
/// headers declare negative counts for exactly that purpose.
pub fn parse_arity(number: &str) -> Arity {
    match number.parse::<i64>() {
        Ok(1) => Arity::One,
        Ok(n) if n > 1 => u32::try_from(n).map_or(Arity::Variable, Arity::Fixed),
        Ok(_) | Err(_) => Arity::Variable,
    }
}

/// Maps a declared type and arity to the element type and final arity.
pub fn map_declared_type(ty: FieldType, declared: Arity) -> (ElementType, Arity) {
    match ty {
        FieldType::Integer => (ElementType::Int, declared),
        FieldType::Float => (ElementType::Float, declared),
        // A flag is a presence bit, never multi-valued.
        FieldType::Flag => (ElementType::Int, Arity::One),
        FieldType::Character => (ElementType::Bytes, declared),
        // Strings are never fixed-size elements, whatever the header claims.
        FieldType::String => (ElementType::Bytes, Arity::Variable),
    }
}

/// Errors raised while decoding a raw text value into a typed one.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid integer '{token}'")]
    InvalidInteger {
        token: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid float '{token}'")]
    InvalidFloat {
        token: String,
        #[source]
        source: ParseFloatError,
    },
}

/// Function from raw text to a typed Avro value.
///
/// Byte-string columns pass through verbatim regardless of arity:
/// multi-valued String/Character data stays opaque delimited text.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decoder {
    Verbatim,
    Int,
    Float,
    IntList,
    FloatList,
}

impl Decoder {
    fn for_column(element: ElementType, arity: Arity) -> Self {
        match (element, arity) {
            (ElementType::Bytes, _) => Self::Verbatim,
            (ElementType::Int, Arity::One) => Self::Int,
            (ElementType::Int, _) => Self::IntList,
            (ElementType::Float, Arity::One) => Self::Float,
            (ElementType::Float, _) => Self::FloatList,
        }
    }

    pub fn decode(self, raw: &str) -> Result<AvroValue, DecodeError> {
        match self {
            Self::Verbatim => Ok(AvroValue::Bytes(raw.as_bytes().to_vec())),
            Self::Int => parse_int(raw).map(AvroValue::Int),
            Self::Float => parse_float(raw).map(AvroValue::Float),
            Self::IntList => raw
                .split(',')
                .map(|tok| parse_int(tok).map(AvroValue::Int))
                .collect::<Result<Vec<_>, _>>()
                .map(AvroValue::Array),
            Self::FloatList => raw
                .split(',')
                .map(|tok| parse_float(tok).map(AvroValue::Float))
                .collect::<Result<Vec<_>, _>>()
                .map(AvroValue::Array),
        }
    }
}

fn parse_int(raw: &str) -> Result<i32, DecodeError> {
    raw.parse().map_err(|source| DecodeError::InvalidInteger {
        token: raw.to_string(),
        source,
    })
}

fn parse_float(raw: &str) -> Result<f32, DecodeError> {
    raw.parse().map_err(|source| DecodeError::InvalidFloat {
        token: raw.to_string(),
        source,
    })
}

/// One induced schema column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Namespace-qualified name, e.g. `POS`, `INFO_DP`, `NA00001_GT`.
    pub name: String,
    pub element: ElementType,
    pub arity: Arity,
    pub decoder: Decoder,
    pub doc: String,
}

impl ColumnSpec {
    /// Multi-valued int/float columns become Avro arrays; everything else,
    /// including variable-arity byte strings, stays scalar.
    fn is_array(&self) -> bool {
        matches!(self.decoder, Decoder::IntList | Decoder::FloatList)
    }

    fn to_field(&self) -> serde_json::Value {
        let scalar = self.element.avro_name();
        let ty = if self.is_array() {
            json!({"type": "array", "items": scalar})
        } else {
            json!(scalar)
        };
        json!({"name": &self.name, "doc": &self.doc, "type": [ty, "null"]})
    }
}

/// Name → decoder lookup shared read-only by every row transcoding call.
pub type ColumnMap = HashMap<String, Decoder>;

/// A parsed `##INFO` or `##FORMAT` declaration.
#[derive(Debug, Clone)]
struct Declaration {
    id: String,
    description: String,
    number: String,
    ty: String,
}

impl Declaration {
    fn into_column(self, namespace: &str) -> Result<ColumnSpec, SchemaError> {
        let ty: FieldType = self.ty.parse()?;
        let (element, arity) = map_declared_type(ty, parse_arity(&self.number));
        Ok(ColumnSpec {
            name: format!("{namespace}{COLUMN_SEPARATOR}{}", self.id),
            element,
            arity,
            decoder: Decoder::for_column(element, arity),
            doc: self.description,
        })
    }
}

/// Parses the bracketed attribute list of a declaration line.
///
/// The first three attributes are comma-delimited `key=value` pairs; the
/// remainder is split once on `=` so a Description may contain commas.
fn parse_declaration(line: &str) -> Result<Declaration, SchemaError> {
    let malformed = || SchemaError::MalformedDeclaration(line.to_string());

    let start = line.find('<').ok_or_else(malformed)? + 1;
    let end = line.find('>').ok_or_else(malformed)?;
    let mut rest = line.get(start..end).ok_or_else(malformed)?;

    let mut attributes: HashMap<&str, &str> = HashMap::new();
    for _ in 0..3 {
        let (head, tail) = rest.split_once(',').ok_or_else(malformed)?;
        let (key, value) = head.split_once('=').ok_or_else(malformed)?;
        attributes.insert(key, value);
        rest = tail;
    }
    let (key, value) = rest.split_once('=').ok_or_else(malformed)?;
    attributes.insert(key, value);

    Ok(Declaration {
        id: attributes.get("ID").ok_or_else(malformed)?.to_string(),
        description: attributes
            .get("Description")
            .ok_or_else(malformed)?
            .trim_matches('"')
            .to_string(),
        number: attributes.get("Number").ok_or_else(malformed)?.to_string(),
        ty: attributes.get("Type").ok_or_else(malformed)?.to_string(),
    })
}

/// The schema induced from a VCF header: an ordered column list plus the
/// decoder map used by the row transcoder. Built once, immutable thereafter.
#[derive(Debug, Clone)]
pub struct InducedSchema {
    columns: Vec<ColumnSpec>,
}

impl InducedSchema {
    /// Induces the schema: seven fixed columns, one column per INFO
    /// declaration in header order, then one column per sample per FORMAT
    /// declaration (sample-major, field-minor).
    pub fn from_header(header: &VcfHeader) -> Result<Self, SchemaError> {
        if header.version < MIN_SUPPORTED_VERSION {
            return Err(SchemaError::UnsupportedVersion(header.version));
        }

        let mut columns = fixed_columns();

        for line in &header.info_declarations {
            columns.push(parse_declaration(line)?.into_column(INFO_NAMESPACE)?);
        }

        let format_declarations = header
            .format_declarations
            .iter()
            .map(|line| parse_declaration(line))
            .collect::<Result<Vec<_>, _>>()?;
        for sample in &header.samples {
            for declaration in &format_declarations {
                columns.push(declaration.clone().into_column(sample)?);
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Qualified column names in schema field order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_map(&self) -> ColumnMap {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.decoder))
            .collect()
    }

    /// The schema as an Avro schema document. Serialization to text happens
    /// only at the output boundary.
    pub fn to_document(&self) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = self.columns.iter().map(ColumnSpec::to_field).collect();
        json!({
            "namespace": SCHEMA_NAMESPACE,
            "type": "record",
            "name": SCHEMA_NAME,
            "fields": fields,
        })
    }
}

fn fixed_columns() -> Vec<ColumnSpec> {
    let bytes_column = |name: &str, doc: &str| ColumnSpec {
        name: name.to_string(),
        element: ElementType::Bytes,
        arity: Arity::One,
        decoder: Decoder::Verbatim,
        doc: doc.to_string(),
    };
    vec![
        bytes_column("CHROM", CHROM_DOC),
        ColumnSpec {
            name: "POS".to_string(),
            element: ElementType::Int,
            arity: Arity::One,
            decoder: Decoder::Int,
            doc: POS_DOC.to_string(),
        },
        bytes_column("ID", ID_DOC),
        bytes_column("REF", REF_DOC),
        bytes_column("ALT", ALT_DOC),
        ColumnSpec {
            name: "QUAL".to_string(),
            element: ElementType::Float,
            arity: Arity::One,
            decoder: Decoder::Float,
            doc: QUAL_DOC.to_string(),
        },
        bytes_column("FILTER", FILTER_DOC),
    ]
}
