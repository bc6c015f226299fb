use std::fs;
use std::path::{Path, PathBuf};

use apache_avro::Reader;
use apache_avro::types::Value;
use tempfile::tempdir;
use vcf2avro::{ConversionConfig, convert_vcf_file};

const SAMPLE_VCF: &str = "##fileformat=VCFv4.2\n\
    ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth\">\n\
    ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\n\
    1\t100\trs1\tA\tG\t29.5\tPASS\tDP=14\tGT\t0|0\t1|0\n\
    1\t200\t.\tC\tT\t.\tq10\tDP=11\tGT\t0|1\t.\n\
    2\t300\trs3\tT\tA\t67\tPASS\tDP=10\tGT\t1|1\t0|0\n";

fn write_vcf(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("input.vcf");
    fs::write(&path, contents).unwrap();
    path
}

fn base_config(source: &Path, dest: PathBuf) -> ConversionConfig {
    ConversionConfig {
        source: source.display().to_string(),
        dest,
        force: false,
        truncate: false,
        quiet: true,
        generate_schema: false,
        schema: None,
    }
}

fn read_records(path: &Path) -> Vec<Value> {
    let file = fs::File::open(path).unwrap();
    let reader = Reader::new(file).unwrap();
    reader.map(|r| r.expect("read avro record")).collect()
}

fn field<'a>(record: &'a Value, name: &str) -> &'a Value {
    let Value::Record(fields) = record else {
        panic!("expected record, got {record:?}");
    };
    let value = &fields.iter().find(|(n, _)| n == name).expect("field").1;
    // Nullable columns come back as unions; look through the wrapper.
    match value {
        Value::Union(_, inner) => &**inner,
        other => other,
    }
}

#[test]
fn converts_vcf_to_readable_container() {
    let dir = tempdir().unwrap();
    let input = write_vcf(&dir, SAMPLE_VCF);
    let output = dir.path().join("out.avro");

    let summary = convert_vcf_file(&base_config(&input, output.clone())).unwrap();
    assert_eq!(summary.rows, 3);
    // NA00002 on row two is the missing sentinel, not malformed data.
    assert_eq!(summary.malformed_samples, 0);

    let records = read_records(&output);
    assert_eq!(records.len(), 3);

    assert_eq!(*field(&records[0], "CHROM"), Value::Bytes(b"1".to_vec()));
    assert_eq!(*field(&records[0], "POS"), Value::Int(100));
    assert_eq!(*field(&records[0], "QUAL"), Value::Float(29.5));
    assert_eq!(*field(&records[0], "INFO_DP"), Value::Int(14));
    assert_eq!(
        *field(&records[0], "NA00002_GT"),
        Value::Bytes(b"1|0".to_vec())
    );

    // Missing sentinels are stored as nulls.
    assert_eq!(*field(&records[1], "ID"), Value::Null);
    assert_eq!(*field(&records[1], "QUAL"), Value::Null);
    assert_eq!(*field(&records[1], "NA00002_GT"), Value::Null);
}

#[test]
fn refuses_existing_destination_without_force() {
    let dir = tempdir().unwrap();
    let input = write_vcf(&dir, SAMPLE_VCF);
    let output = dir.path().join("out.avro");
    fs::write(&output, "already here").unwrap();

    let err = convert_vcf_file(&base_config(&input, output.clone())).unwrap_err();
    assert!(err.to_string().contains("--force"));
    assert_eq!(fs::read_to_string(&output).unwrap(), "already here");

    let mut config = base_config(&input, output);
    config.force = true;
    convert_vcf_file(&config).unwrap();
}

#[test]
fn rejects_unsupported_version_before_creating_output() {
    let dir = tempdir().unwrap();
    let input = write_vcf(
        &dir,
        "##fileformat=VCFv3.3\n\
         #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
         1\t100\t.\tA\tG\t50\tPASS\t.\n",
    );
    let output = dir.path().join("out.avro");

    let err = convert_vcf_file(&base_config(&input, output.clone())).unwrap_err();
    assert!(err.to_string().contains("not supported"));
    assert!(!output.exists());
}

#[test]
fn generate_schema_mode_writes_a_valid_schema_and_no_container() {
    let dir = tempdir().unwrap();
    let input = write_vcf(&dir, SAMPLE_VCF);
    let schema_path = dir.path().join("schema.json");

    let mut config = base_config(&input, schema_path.clone());
    config.generate_schema = true;
    let summary = convert_vcf_file(&config).unwrap();
    assert_eq!(summary.rows, 0);

    let raw = fs::read_to_string(&schema_path).unwrap();
    let schema = apache_avro::Schema::parse_str(&raw).unwrap();
    let apache_avro::Schema::Record(record) = schema else {
        panic!("expected record schema");
    };
    let names: Vec<&str> = record.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "CHROM",
            "POS",
            "ID",
            "REF",
            "ALT",
            "QUAL",
            "FILTER",
            "INFO_DP",
            "NA00001_GT",
            "NA00002_GT",
        ]
    );
}

#[test]
fn external_schema_selects_a_column_subset() {
    let dir = tempdir().unwrap();
    let input = write_vcf(&dir, SAMPLE_VCF);
    let schema_path = dir.path().join("subset.json");
    fs::write(
        &schema_path,
        r#"{"namespace": "vcf.avro", "type": "record", "name": "VCF", "fields": [
            {"name": "CHROM", "type": ["bytes", "null"]},
            {"name": "POS", "type": ["int", "null"]},
            {"name": "INFO_DP", "type": ["int", "null"]}
        ]}"#,
    )
    .unwrap();
    let output = dir.path().join("subset.avro");

    let mut config = base_config(&input, output.clone());
    config.schema = Some(schema_path);
    convert_vcf_file(&config).unwrap();

    let records = read_records(&output);
    assert_eq!(records.len(), 3);
    let Value::Record(fields) = &records[0] else {
        panic!("expected record");
    };
    assert_eq!(fields.len(), 3);
    assert_eq!(*field(&records[2], "POS"), Value::Int(300));
    assert_eq!(*field(&records[2], "INFO_DP"), Value::Int(10));
}

#[test]
fn external_schema_with_unknown_column_fails() {
    let dir = tempdir().unwrap();
    let input = write_vcf(&dir, SAMPLE_VCF);
    let schema_path = dir.path().join("bad.json");
    fs::write(
        &schema_path,
        r#"{"type": "record", "name": "VCF", "fields": [
            {"name": "INFO_MISSING", "type": ["int", "null"]}
        ]}"#,
    )
    .unwrap();

    let mut config = base_config(&input, dir.path().join("out.avro"));
    config.schema = Some(schema_path);
    let err = convert_vcf_file(&config).unwrap_err();
    assert!(err.to_string().contains("INFO_MISSING"));
}

#[test]
fn gzip_input_is_decompressed_transparently() {
    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};

    let dir = tempdir().unwrap();
    let input = dir.path().join("input.vcf.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(SAMPLE_VCF.as_bytes()).unwrap();
    fs::write(&input, encoder.finish().unwrap()).unwrap();
    let output = dir.path().join("out.avro");

    let summary = convert_vcf_file(&base_config(&input, output.clone())).unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(read_records(&output).len(), 3);
}

#[test]
fn truncation_is_reflected_in_stored_values() {
    let dir = tempdir().unwrap();
    let long_ref = "G".repeat(300);
    let input = write_vcf(
        &dir,
        &format!(
            "##fileformat=VCFv4.2\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
             1\t100\t.\t{long_ref}\tA\t50\tPASS\t.\n"
        ),
    );
    let output = dir.path().join("out.avro");

    let mut config = base_config(&input, output.clone());
    config.truncate = true;
    let summary = convert_vcf_file(&config).unwrap();
    assert_eq!(summary.truncated_values, 1);

    let records = read_records(&output);
    let Value::Bytes(bytes) = field(&records[0], "REF") else {
        panic!("expected bytes");
    };
    assert_eq!(bytes.len(), 254);
    assert_eq!(bytes[253], b'+');
}
