use anyhow::Result;

fn main() -> Result<()> {
    vcf2avro::cli::run()
}
