#![doc = include_str!("../README.md")]

pub mod cli;
pub mod conversion;
pub mod header;
pub mod output;
pub mod schema;
pub mod smart_reader;
pub mod transcode;

pub use conversion::{ConversionConfig, ConversionSummary, convert_vcf_file};
